//! The delegation cache (§4.6). The chain is always the source of truth;
//! this store only mirrors `DelegateStatusChanged` events for fast listing.

use std::sync::Arc;

use fusevault_core::error::FuseVaultError;
use fusevault_core::model::DelegationRecord;
use fusevault_core::types::{TxHash, WalletAddress};

use crate::db::{delegation_key, StoreDb};

pub struct DelegationCache {
    db: Arc<StoreDb>,
}

impl DelegationCache {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    /// Upserts the cached relationship from an observed
    /// `DelegateStatusChanged(owner, delegate, status)` event.
    pub fn sync_from_event(
        &self,
        owner: &WalletAddress,
        delegate: &WalletAddress,
        is_active: bool,
        tx_hash: Option<TxHash>,
        block_number: Option<u64>,
        updated_at: i64,
    ) -> Result<(), FuseVaultError> {
        let record = DelegationRecord {
            owner_address: owner.clone(),
            delegate_address: delegate.clone(),
            is_active,
            last_tx_hash: tx_hash,
            block_number,
            updated_at,
        };
        let bytes = bincode::serialize(&record).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        self.db
            .delegations
            .insert(delegation_key(owner.as_str(), delegate.as_str()), bytes)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get(
        &self,
        owner: &WalletAddress,
        delegate: &WalletAddress,
    ) -> Result<Option<DelegationRecord>, FuseVaultError> {
        match self
            .db
            .delegations
            .get(delegation_key(owner.as_str(), delegate.as_str()))
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Every cached delegate of `owner`, active or not.
    pub fn list_for_owner(&self, owner: &WalletAddress) -> Result<Vec<DelegationRecord>, FuseVaultError> {
        let mut prefix = owner.as_str().as_bytes().to_vec();
        prefix.push(0);
        let mut out = Vec::new();
        for item in self.db.delegations.scan_prefix(prefix) {
            let (_, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: &str) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}{}", "0".repeat(32), tag)).unwrap()
    }

    #[test]
    fn sync_then_get_reflects_latest_status() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let cache = DelegationCache::new(db);
        let owner = addr("aaaaaaaa");
        let delegate = addr("bbbbbbbb");
        cache.sync_from_event(&owner, &delegate, true, None, Some(10), 100).unwrap();
        assert!(cache.get(&owner, &delegate).unwrap().unwrap().is_active);
        cache.sync_from_event(&owner, &delegate, false, None, Some(20), 200).unwrap();
        assert!(!cache.get(&owner, &delegate).unwrap().unwrap().is_active);
    }

    #[test]
    fn list_for_owner_returns_only_that_owner() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let cache = DelegationCache::new(db);
        let owner_a = addr("aaaaaaaa");
        let owner_b = addr("cccccccc");
        let delegate = addr("bbbbbbbb");
        cache.sync_from_event(&owner_a, &delegate, true, None, None, 1).unwrap();
        cache.sync_from_event(&owner_b, &delegate, true, None, None, 1).unwrap();
        assert_eq!(cache.list_for_owner(&owner_a).unwrap().len(), 1);
    }
}
