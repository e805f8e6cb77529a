//! The asset store (§4.3): versioned records plus a current-version pointer
//! per asset, kept consistent under concurrent writers via a bounded
//! compare-and-swap retry loop over a sled transaction.

use std::sync::Arc;

use serde_json::Value;
use sled::transaction::{abort, TransactionError, Transactional};

use fusevault_core::constants::VERSION_CAS_MAX_ATTEMPTS;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::AssetVersionRecord;
use fusevault_core::types::{AssetId, VersionNumber, WalletAddress};

use crate::db::{asset_prefix, version_key, StoreDb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    DeletedNow,
    AlreadyDeleted,
}

pub struct AssetStore {
    db: Arc<StoreDb>,
}

impl AssetStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    fn get_version_raw(
        &self,
        asset_id: &str,
        version: VersionNumber,
    ) -> Result<Option<AssetVersionRecord>, FuseVaultError> {
        match self
            .db
            .asset_versions
            .get(version_key(asset_id, version))
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn current_version_number(&self, asset_id: &str) -> Result<Option<VersionNumber>, FuseVaultError> {
        match self
            .db
            .asset_current
            .get(asset_id.as_bytes())
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(&bytes[..4]);
                Ok(Some(u32::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// The live version of an asset, regardless of `is_deleted` — callers
    /// that need to exclude soft-deleted assets check the flag themselves
    /// (see `find_current`).
    pub fn find_any_including_deleted(
        &self,
        asset_id: &AssetId,
    ) -> Result<Option<AssetVersionRecord>, FuseVaultError> {
        match self.current_version_number(asset_id.as_str())? {
            Some(v) => self.get_version_raw(asset_id.as_str(), v),
            None => Ok(None),
        }
    }

    /// The live, non-deleted version of an asset.
    pub fn find_current(&self, asset_id: &AssetId) -> Result<Option<AssetVersionRecord>, FuseVaultError> {
        Ok(self
            .find_any_including_deleted(asset_id)?
            .filter(|r| !r.is_deleted))
    }

    pub fn find_version(
        &self,
        asset_id: &AssetId,
        version: VersionNumber,
    ) -> Result<Option<AssetVersionRecord>, FuseVaultError> {
        self.get_version_raw(asset_id.as_str(), version)
    }

    /// Every stored version of an asset, ascending by version number.
    pub fn list_versions(&self, asset_id: &AssetId) -> Result<Vec<AssetVersionRecord>, FuseVaultError> {
        let prefix = asset_prefix(asset_id.as_str());
        let mut out = Vec::new();
        for item in self.db.asset_versions.scan_prefix(prefix) {
            let (_, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    /// Every asset currently owned by `owner` (current version only),
    /// including soft-deleted ones if `include_deleted`.
    pub fn list_by_owner(
        &self,
        owner: &WalletAddress,
        include_deleted: bool,
    ) -> Result<Vec<AssetVersionRecord>, FuseVaultError> {
        let mut out = Vec::new();
        for item in self.db.asset_current.iter() {
            let (asset_id_bytes, _) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            let asset_id = String::from_utf8_lossy(&asset_id_bytes).to_string();
            if let Some(record) = self.find_any_including_deleted(&AssetId::new(asset_id))? {
                if record.owner_address == *owner && (include_deleted || !record.is_deleted) {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    /// Creates the very first version of a brand-new asset. Fails with
    /// `AssetAlreadyExists` if one is already registered under this id.
    pub fn insert_new_asset(&self, record: AssetVersionRecord) -> Result<AssetVersionRecord, FuseVaultError> {
        let asset_id = record.asset_id.as_str().to_string();
        let result = (&self.db.asset_versions, &self.db.asset_current).transaction(
            |(versions, current)| {
                if current.get(asset_id.as_bytes())?.is_some() {
                    return abort(TxConflict::AlreadyExists);
                }
                let bytes = bincode::serialize(&record)
                    .map_err(|e| sled::transaction::ConflictableTransactionError::Abort(TxConflict::Serialize(e.to_string())))?;
                versions.insert(version_key(&asset_id, record.version_number), bytes)?;
                current.insert(asset_id.as_bytes(), &record.version_number.to_be_bytes())?;
                Ok(record.clone())
            },
        );
        map_tx_result(result, &asset_id)
    }

    /// Applies `mutate` to the current version (or `None` if this is the
    /// first version) and installs the result as the new current version,
    /// retrying the optimistic-concurrency check up to
    /// `VERSION_CAS_MAX_ATTEMPTS` times if a concurrent writer won the race.
    pub fn create_new_version(
        &self,
        asset_id: &AssetId,
        mutate: impl Fn(Option<AssetVersionRecord>) -> Result<AssetVersionRecord, FuseVaultError>,
    ) -> Result<AssetVersionRecord, FuseVaultError> {
        for _ in 0..VERSION_CAS_MAX_ATTEMPTS {
            let before = self.find_any_including_deleted(asset_id)?;
            let expected = before.as_ref().map(|r| r.version_number);
            let new_record = mutate(before.clone())?;

            let asset_id_str = asset_id.as_str().to_string();
            let new_version = new_record.version_number;
            let before_bytes = before
                .as_ref()
                .map(|r| bincode::serialize(r).map_err(|e| FuseVaultError::Serialization(e.to_string())))
                .transpose()?;

            let result = (&self.db.asset_versions, &self.db.asset_current).transaction(
                |(versions, current)| {
                    let actual = current.get(asset_id_str.as_bytes())?.map(|b| {
                        let mut arr = [0u8; 4];
                        arr.copy_from_slice(&b[..4]);
                        u32::from_be_bytes(arr)
                    });
                    if actual != expected {
                        return abort(TxConflict::Cas);
                    }
                    if let (Some(prev), Some(bytes)) = (&before, &before_bytes) {
                        let mut superseded = prev.clone();
                        superseded.is_current = false;
                        let superseded_bytes = bincode::serialize(&superseded).map_err(|e| {
                            sled::transaction::ConflictableTransactionError::Abort(TxConflict::Serialize(e.to_string()))
                        })?;
                        let _ = bytes;
                        versions.insert(version_key(&asset_id_str, prev.version_number), superseded_bytes)?;
                    }
                    let new_bytes = bincode::serialize(&new_record).map_err(|e| {
                        sled::transaction::ConflictableTransactionError::Abort(TxConflict::Serialize(e.to_string()))
                    })?;
                    versions.insert(version_key(&asset_id_str, new_version), new_bytes)?;
                    current.insert(asset_id_str.as_bytes(), &new_version.to_be_bytes())?;
                    Ok(new_record.clone())
                },
            );
            match map_tx_result(result, asset_id.as_str()) {
                Ok(record) => return Ok(record),
                Err(FuseVaultError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FuseVaultError::VersionConflict {
            asset_id: asset_id.as_str().to_string(),
            attempts: VERSION_CAS_MAX_ATTEMPTS,
        })
    }

    /// Updates only the DB-resident non-critical metadata of the current
    /// version in place — this does not mint a new version (§4.3: non-critical
    /// metadata changes are not chain-anchored events).
    pub fn update_non_critical_metadata(
        &self,
        asset_id: &AssetId,
        non_critical_metadata: Value,
        now: i64,
    ) -> Result<AssetVersionRecord, FuseVaultError> {
        self.create_new_version(asset_id, |current| {
            let mut record = current.ok_or_else(|| FuseVaultError::AssetNotFound(asset_id.to_string()))?;
            record.non_critical_metadata = non_critical_metadata.clone();
            record.last_updated = now;
            Ok(record)
        })
    }

    /// Marks every version of an asset deleted with an identical
    /// `deleted_at`, matching invariant 5 (soft delete does not mint a new
    /// version number; it flips flags in place on every existing row).
    pub fn soft_delete(
        &self,
        asset_id: &AssetId,
        deleted_by: &WalletAddress,
        now: i64,
    ) -> Result<DeleteOutcome, FuseVaultError> {
        let asset_id_str = asset_id.as_str().to_string();
        let deleted_by = deleted_by.clone();
        for _ in 0..VERSION_CAS_MAX_ATTEMPTS {
            let before = self
                .find_any_including_deleted(asset_id)?
                .ok_or_else(|| FuseVaultError::AssetNotFound(asset_id.to_string()))?;
            if before.is_deleted {
                return Ok(DeleteOutcome::AlreadyDeleted);
            }
            let expected = before.version_number;
            let mut versions = self.list_versions(asset_id)?;
            for record in &mut versions {
                record.is_deleted = true;
                record.deleted_by = Some(deleted_by.clone());
                record.deleted_at = Some(now);
                record.last_updated = now;
            }

            let result = (&self.db.asset_versions, &self.db.asset_current).transaction(
                |(tree, current)| {
                    let actual = current.get(asset_id_str.as_bytes())?.map(|b| {
                        let mut arr = [0u8; 4];
                        arr.copy_from_slice(&b[..4]);
                        u32::from_be_bytes(arr)
                    });
                    if actual != Some(expected) {
                        return abort(TxConflict::Cas);
                    }
                    for record in &versions {
                        let bytes = bincode::serialize(record).map_err(|e| {
                            sled::transaction::ConflictableTransactionError::Abort(TxConflict::Serialize(e.to_string()))
                        })?;
                        tree.insert(version_key(&asset_id_str, record.version_number), bytes)?;
                    }
                    Ok(())
                },
            );
            match map_tx_result(result, &asset_id_str) {
                Ok(()) => return Ok(DeleteOutcome::DeletedNow),
                Err(FuseVaultError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FuseVaultError::VersionConflict { asset_id: asset_id_str, attempts: VERSION_CAS_MAX_ATTEMPTS })
    }

    /// Hard-removes every version row still marked deleted (§4.3). Used only
    /// during owner-recreate: `create_new_version`'s CAS only ever rewrites
    /// the key of the version that was current at the time of the delete and
    /// the freshly minted version-1 key, so any earlier version accumulated
    /// before the delete (e.g. v2 of a v1→v2→v3 history) would otherwise be
    /// left behind forever with `is_deleted=true`. Callers must run this
    /// *after* the recreating `create_new_version` call has landed, not
    /// before — the pointer this CAS reads still needs the superseded
    /// deleted version to exist for that one transaction.
    pub fn purge_deleted(&self, asset_id: &AssetId) -> Result<(), FuseVaultError> {
        let asset_id_str = asset_id.as_str().to_string();
        for _ in 0..VERSION_CAS_MAX_ATTEMPTS {
            let expected = self.current_version_number(&asset_id_str)?;
            let to_remove: Vec<VersionNumber> = self
                .list_versions(asset_id)?
                .into_iter()
                .filter(|r| r.is_deleted)
                .map(|r| r.version_number)
                .collect();
            if to_remove.is_empty() {
                return Ok(());
            }

            let result = (&self.db.asset_versions, &self.db.asset_current).transaction(
                |(versions, current)| {
                    let actual = current.get(asset_id_str.as_bytes())?.map(|b| {
                        let mut arr = [0u8; 4];
                        arr.copy_from_slice(&b[..4]);
                        u32::from_be_bytes(arr)
                    });
                    if actual != expected {
                        return abort(TxConflict::Cas);
                    }
                    for version in &to_remove {
                        versions.remove(version_key(&asset_id_str, *version))?;
                    }
                    Ok(())
                },
            );
            match map_tx_result(result, &asset_id_str) {
                Ok(()) => return Ok(()),
                Err(FuseVaultError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FuseVaultError::VersionConflict { asset_id: asset_id_str, attempts: VERSION_CAS_MAX_ATTEMPTS })
    }

    /// Clears the deleted flags on the current version. Used by the recreate
    /// path when a new upload lands on top of a soft-deleted asset owned by
    /// the same caller.
    pub fn restore_deletion_flags(&self, asset_id: &AssetId, now: i64) -> Result<AssetVersionRecord, FuseVaultError> {
        self.create_new_version(asset_id, |current| {
            let mut record = current.ok_or_else(|| FuseVaultError::AssetNotFound(asset_id.to_string()))?;
            record.is_deleted = false;
            record.deleted_by = None;
            record.deleted_at = None;
            record.last_updated = now;
            Ok(record)
        })
    }
}

#[derive(Debug)]
enum TxConflict {
    AlreadyExists,
    Cas,
    Serialize(String),
}

fn map_tx_result<T>(
    result: Result<T, TransactionError<TxConflict>>,
    asset_id: &str,
) -> Result<T, FuseVaultError> {
    result.map_err(|e| match e {
        TransactionError::Abort(TxConflict::AlreadyExists) => {
            FuseVaultError::AssetAlreadyExists(asset_id.to_string())
        }
        TransactionError::Abort(TxConflict::Cas) => {
            FuseVaultError::VersionConflict { asset_id: asset_id.to_string(), attempts: 1 }
        }
        TransactionError::Abort(TxConflict::Serialize(msg)) => FuseVaultError::Serialization(msg),
        TransactionError::Storage(e) => FuseVaultError::Storage(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusevault_core::types::{Cid, TxHash};
    use serde_json::json;

    fn make_record(asset_id: &str, owner: &str, version: u32) -> AssetVersionRecord {
        AssetVersionRecord {
            asset_id: AssetId::new(asset_id),
            owner_address: WalletAddress::parse(owner).unwrap(),
            version_number: version,
            ipfs_version: version,
            critical_metadata: json!({"a": 1}),
            non_critical_metadata: json!({}),
            ipfs_hash: Cid::new("bafy000").unwrap(),
            chain_tx_id: TxHash::parse(&format!("0x{}", "1".repeat(64))).unwrap(),
            is_current: true,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            previous_version_id: None,
            document_history: vec![],
            performed_by: WalletAddress::parse(owner).unwrap(),
            is_delegated_action: false,
            last_updated: 1000,
            last_verified: None,
        }
    }

    #[test]
    fn insert_then_find_current_roundtrips() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = AssetStore::new(db);
        let owner = "0xaaaa000000000000000000000000000000bbbb";
        let record = make_record("asset-1", owner, 1);
        store.insert_new_asset(record.clone()).unwrap();
        let found = store.find_current(&AssetId::new("asset-1")).unwrap().unwrap();
        assert_eq!(found.version_number, 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = AssetStore::new(db);
        let owner = "0xaaaa000000000000000000000000000000bbbb";
        store.insert_new_asset(make_record("asset-1", owner, 1)).unwrap();
        let err = store.insert_new_asset(make_record("asset-1", owner, 1)).unwrap_err();
        assert!(matches!(err, FuseVaultError::AssetAlreadyExists(_)));
    }

    #[test]
    fn new_version_supersedes_old_current() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = AssetStore::new(db);
        let owner = "0xaaaa000000000000000000000000000000bbbb";
        let asset_id = AssetId::new("asset-1");
        store.insert_new_asset(make_record("asset-1", owner, 1)).unwrap();
        store
            .create_new_version(&asset_id, |current| {
                let mut next = current.unwrap();
                next.version_number += 1;
                next.previous_version_id = Some(1);
                next.document_history.push(1);
                Ok(next)
            })
            .unwrap();
        let v1 = store.find_version(&asset_id, 1).unwrap().unwrap();
        assert!(!v1.is_current);
        let current = store.find_current(&asset_id).unwrap().unwrap();
        assert_eq!(current.version_number, 2);
        assert_eq!(current.document_history, vec![1]);
    }

    #[test]
    fn soft_delete_then_restore() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = AssetStore::new(db);
        let owner = "0xaaaa000000000000000000000000000000bbbb";
        let asset_id = AssetId::new("asset-1");
        store.insert_new_asset(make_record("asset-1", owner, 1)).unwrap();
        let outcome = store
            .soft_delete(&asset_id, &WalletAddress::parse(owner).unwrap(), 2000)
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::DeletedNow);
        assert!(store.find_current(&asset_id).unwrap().is_none());
        let again = store
            .soft_delete(&asset_id, &WalletAddress::parse(owner).unwrap(), 2001)
            .unwrap();
        assert_eq!(again, DeleteOutcome::AlreadyDeleted);

        store.restore_deletion_flags(&asset_id, 3000).unwrap();
        assert!(store.find_current(&asset_id).unwrap().is_some());
    }
}
