//! Storage side of the API-key subsystem (§4.7). Validation (HMAC
//! verification) lives in `fusevault-crypto` / `fusevault-auth`; this is
//! purely the lookup-by-hash and per-wallet bookkeeping.

use std::sync::Arc;

use fusevault_core::constants::API_KEY_MAX_PER_WALLET;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::{ApiKeyRecord, Permission};
use fusevault_core::types::{Timestamp, WalletAddress};

use crate::db::StoreDb;

pub struct ApiKeyStore {
    db: Arc<StoreDb>,
}

impl ApiKeyStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    fn all(&self) -> Result<Vec<ApiKeyRecord>, FuseVaultError> {
        let mut out = Vec::new();
        for item in self.db.api_keys.iter() {
            let (_, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    /// Registers a newly issued key. Rejects once the wallet already holds
    /// `API_KEY_MAX_PER_WALLET` active keys.
    pub fn insert(&self, record: ApiKeyRecord) -> Result<(), FuseVaultError> {
        let active_count = self
            .list_by_wallet(&record.wallet_address)?
            .iter()
            .filter(|k| k.is_active)
            .count();
        if active_count >= API_KEY_MAX_PER_WALLET {
            return Err(FuseVaultError::Validation(format!(
                "wallet {} already holds the maximum of {} active API keys",
                record.wallet_address, API_KEY_MAX_PER_WALLET
            )));
        }
        let bytes = bincode::serialize(&record).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        self.db
            .api_keys
            .insert(record.key_hash, bytes)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Looks a key up by its SHA256 hash. A key found past its `expires_at`
    /// is deactivated in place as a side effect and reported as not found,
    /// mirroring the lazy-expiry behavior of the original lookup.
    pub fn lookup_by_hash(
        &self,
        key_hash: &[u8; 32],
        now: Timestamp,
    ) -> Result<Option<ApiKeyRecord>, FuseVaultError> {
        let Some(bytes) = self
            .db
            .api_keys
            .get(key_hash)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        let mut record: ApiKeyRecord =
            bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        if !record.is_active {
            return Ok(None);
        }
        if let Some(expires_at) = record.expires_at {
            if now >= expires_at {
                record.is_active = false;
                self.save(&record)?;
                return Ok(None);
            }
        }
        Ok(Some(record))
    }

    fn save(&self, record: &ApiKeyRecord) -> Result<(), FuseVaultError> {
        let bytes = bincode::serialize(record).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        self.db
            .api_keys
            .insert(record.key_hash, bytes)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Updates `last_used_at` after a successful authentication.
    pub fn mark_used(&self, key_hash: &[u8; 32], now: Timestamp) -> Result<(), FuseVaultError> {
        if let Some(bytes) = self
            .db
            .api_keys
            .get(key_hash)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
        {
            let mut record: ApiKeyRecord =
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
            record.last_used_at = Some(now);
            self.save(&record)?;
        }
        Ok(())
    }

    pub fn revoke(&self, key_hash: &[u8; 32]) -> Result<(), FuseVaultError> {
        if let Some(bytes) = self
            .db
            .api_keys
            .get(key_hash)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
        {
            let mut record: ApiKeyRecord =
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
            record.is_active = false;
            self.save(&record)?;
        }
        Ok(())
    }

    pub fn update_permissions(
        &self,
        key_hash: &[u8; 32],
        permissions: Vec<Permission>,
    ) -> Result<(), FuseVaultError> {
        let bytes = self
            .db
            .api_keys
            .get(key_hash)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
            .ok_or_else(|| FuseVaultError::Validation("unknown API key".into()))?;
        let mut record: ApiKeyRecord =
            bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        record.permissions = permissions;
        self.save(&record)
    }

    pub fn list_by_wallet(&self, wallet: &WalletAddress) -> Result<Vec<ApiKeyRecord>, FuseVaultError> {
        Ok(self.all()?.into_iter().filter(|k| k.wallet_address == *wallet).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn wallet() -> WalletAddress {
        WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap()
    }

    fn record(hash: u8, expires_at: Option<Timestamp>) -> ApiKeyRecord {
        ApiKeyRecord {
            key_hash: [hash; 32],
            wallet_address: wallet(),
            name: "test key".into(),
            permissions: vec![Permission::Read],
            expires_at,
            created_at: 0,
            last_used_at: None,
            is_active: true,
            metadata: Value::Null,
        }
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = ApiKeyStore::new(db);
        store.insert(record(1, None)).unwrap();
        let found = store.lookup_by_hash(&[1u8; 32], 100).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn expired_key_deactivates_on_lookup() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = ApiKeyStore::new(db);
        store.insert(record(2, Some(50))).unwrap();
        assert!(store.lookup_by_hash(&[2u8; 32], 100).unwrap().is_none());
        let still_stored = store.list_by_wallet(&wallet()).unwrap();
        assert!(!still_stored[0].is_active);
    }

    #[test]
    fn revoked_key_is_not_found() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = ApiKeyStore::new(db);
        store.insert(record(3, None)).unwrap();
        store.revoke(&[3u8; 32]).unwrap();
        assert!(store.lookup_by_hash(&[3u8; 32], 100).unwrap().is_none());
    }

    #[test]
    fn max_per_wallet_is_enforced() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let store = ApiKeyStore::new(db);
        for i in 0..fusevault_core::constants::API_KEY_MAX_PER_WALLET {
            store.insert(record(i as u8, None)).unwrap();
        }
        let err = store.insert(record(250, None)).unwrap_err();
        assert!(matches!(err, FuseVaultError::Validation(_)));
    }
}
