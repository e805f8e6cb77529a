use std::sync::Arc;

use fusevault_core::model::Action;
use fusevault_core::types::{AssetId, Cid, TxHash, WalletAddress};
use fusevault_store::{AssetStore, DeleteOutcome, StoreDb, TransactionLog};
use serde_json::json;

fn owner() -> WalletAddress {
    WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap()
}

fn seed_asset(store: &AssetStore, asset_id: &str) {
    let owner = owner();
    store
        .insert_new_asset(fusevault_core::model::AssetVersionRecord {
            asset_id: AssetId::new(asset_id),
            owner_address: owner.clone(),
            version_number: 1,
            ipfs_version: 1,
            critical_metadata: json!({"name": "first"}),
            non_critical_metadata: json!({}),
            ipfs_hash: Cid::new("bafy1").unwrap(),
            chain_tx_id: TxHash::parse(&format!("0x{}", "1".repeat(64))).unwrap(),
            is_current: true,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            previous_version_id: None,
            document_history: vec![],
            performed_by: owner,
            is_delegated_action: false,
            last_updated: 1_000,
            last_verified: None,
        })
        .unwrap();
}

// Invariant 2 (§8): version_number is monotonically increasing per asset and
// previous versions are never mutated except for is_current.
#[test]
fn version_history_is_monotonic_and_append_only() {
    let db = Arc::new(StoreDb::open_temporary().unwrap());
    let store = AssetStore::new(db);
    let asset_id = AssetId::new("asset-42");
    seed_asset(&store, "asset-42");

    for n in 2..=4u32 {
        store
            .create_new_version(&asset_id, |current| {
                let mut next = current.unwrap();
                next.version_number = n;
                next.ipfs_version = n;
                next.previous_version_id = Some(n - 1);
                next.document_history.push(n - 1);
                next.ipfs_hash = Cid::new(format!("bafy{}", n)).unwrap();
                Ok(next)
            })
            .unwrap();
    }

    let history = store.list_versions(&asset_id).unwrap();
    assert_eq!(history.len(), 4);
    let numbers: Vec<u32> = history.iter().map(|r| r.version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert!(history[..3].iter().all(|r| !r.is_current));
    assert!(history[3].is_current);

    let current = store.find_current(&asset_id).unwrap().unwrap();
    assert_eq!(current.document_history, vec![1, 2, 3]);
}

// Scenario B (§8): soft delete then recreate restores availability without
// reusing or corrupting the prior version history.
#[test]
fn soft_delete_hides_asset_and_recreate_restores_it() {
    let db = Arc::new(StoreDb::open_temporary().unwrap());
    let store = AssetStore::new(db.clone());
    let log = TransactionLog::new(db);
    let asset_id = AssetId::new("asset-7");
    let owner = owner();
    seed_asset(&store, "asset-7");
    log.append(&asset_id, Action::Create, &owner, &owner, 1_000, json!({})).unwrap();

    let outcome = store.soft_delete(&asset_id, &owner, 2_000).unwrap();
    assert_eq!(outcome, DeleteOutcome::DeletedNow);
    log.append(&asset_id, Action::Delete, &owner, &owner, 2_000, json!({})).unwrap();
    assert!(store.find_current(&asset_id).unwrap().is_none());
    assert!(store.find_any_including_deleted(&asset_id).unwrap().unwrap().is_deleted);

    store.restore_deletion_flags(&asset_id, 3_000).unwrap();
    log.append(&asset_id, Action::RecreateDeleted, &owner, &owner, 3_000, json!({})).unwrap();
    let restored = store.find_current(&asset_id).unwrap().unwrap();
    assert!(!restored.is_deleted);

    let summary = log.summarize(&asset_id).unwrap();
    assert!(summary.contains(&(Action::RecreateDeleted, 1)));
    assert!(summary.contains(&(Action::Delete, 1)));
}

#[test]
fn list_by_owner_excludes_deleted_by_default() {
    let db = Arc::new(StoreDb::open_temporary().unwrap());
    let store = AssetStore::new(db);
    seed_asset(&store, "asset-a");
    seed_asset(&store, "asset-b");
    store.soft_delete(&AssetId::new("asset-b"), &owner(), 1).unwrap();

    let visible = store.list_by_owner(&owner(), false).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].asset_id.as_str(), "asset-a");

    let all = store.list_by_owner(&owner(), true).unwrap();
    assert_eq!(all.len(), 2);
}
