//! The pending-transaction coordinator (§4.5): bridges the gap between
//! handing a user an unsigned transaction and them broadcasting it signed.

use std::sync::Arc;

use uuid::Uuid;

use fusevault_core::constants::PENDING_TX_DEFAULT_TTL_SECS;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::PendingTxRecord;
use fusevault_core::types::{Timestamp, WalletAddress};

use crate::db::StoreDb;

pub struct PendingTxCoordinator {
    db: Arc<StoreDb>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PendingTxStats {
    pub total: usize,
    pub expired: usize,
}

impl PendingTxCoordinator {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    /// Stages a new pending transaction and returns its id (`fv-pending-{uuid}`).
    pub fn store(
        &self,
        initiator_address: &WalletAddress,
        operation_type: &str,
        unsigned_tx_hex: String,
        resume_data: serde_json::Value,
        created_at: Timestamp,
        ttl_secs: Option<u64>,
    ) -> Result<PendingTxRecord, FuseVaultError> {
        let tx_id = format!("fv-pending-{}", Uuid::new_v4());
        let record = PendingTxRecord {
            tx_id: tx_id.clone(),
            initiator_address: initiator_address.clone(),
            operation_type: operation_type.to_string(),
            unsigned_tx_hex,
            resume_data,
            created_at,
            ttl_secs: ttl_secs.unwrap_or(PENDING_TX_DEFAULT_TTL_SECS),
        };
        self.put(&record)?;
        Ok(record)
    }

    fn put(&self, record: &PendingTxRecord) -> Result<(), FuseVaultError> {
        let bytes = bincode::serialize(record).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        self.db
            .pending_txs
            .insert(record.tx_id.as_bytes(), bytes)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Fetches a pending transaction, returning `PendingTxNotFound` if it is
    /// missing or has expired relative to `now`.
    pub fn get(&self, tx_id: &str, now: Timestamp) -> Result<PendingTxRecord, FuseVaultError> {
        let record = self
            .db
            .pending_txs
            .get(tx_id.as_bytes())
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
            .ok_or_else(|| FuseVaultError::PendingTxNotFound(tx_id.to_string()))?;
        let record: PendingTxRecord =
            bincode::deserialize(&record).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        if record.is_expired(now) {
            return Err(FuseVaultError::PendingTxNotFound(tx_id.to_string()));
        }
        Ok(record)
    }

    /// Removes a pending transaction, called once it has either been
    /// broadcast or explicitly cancelled.
    pub fn remove(&self, tx_id: &str) -> Result<(), FuseVaultError> {
        self.db
            .pending_txs
            .remove(tx_id.as_bytes())
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Every non-expired pending transaction initiated by `wallet`.
    pub fn list_by_user(
        &self,
        wallet: &WalletAddress,
        now: Timestamp,
    ) -> Result<Vec<PendingTxRecord>, FuseVaultError> {
        let mut out = Vec::new();
        for item in self.db.pending_txs.iter() {
            let (_, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            let record: PendingTxRecord =
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
            if record.initiator_address == *wallet && !record.is_expired(now) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Sweeps and removes every expired pending transaction, returning how
    /// many were purged. Run periodically by the background sweep (§5).
    pub fn purge_expired(&self, now: Timestamp) -> Result<usize, FuseVaultError> {
        let mut purged = 0;
        let mut expired_keys = Vec::new();
        for item in self.db.pending_txs.iter() {
            let (key, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            let record: PendingTxRecord =
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
            if record.is_expired(now) {
                expired_keys.push(key.to_vec());
            }
        }
        for key in expired_keys {
            self.db.pending_txs.remove(key).map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            purged += 1;
        }
        Ok(purged)
    }

    pub fn stats(&self, now: Timestamp) -> Result<PendingTxStats, FuseVaultError> {
        let mut stats = PendingTxStats::default();
        for item in self.db.pending_txs.iter() {
            let (_, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            let record: PendingTxRecord =
                bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
            stats.total += 1;
            if record.is_expired(now) {
                stats.expired += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wallet() -> WalletAddress {
        WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap()
    }

    #[test]
    fn store_then_get_roundtrips() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let coord = PendingTxCoordinator::new(db);
        let w = wallet();
        let record = coord.store(&w, "upload", "0xdead".into(), json!({}), 1000, None).unwrap();
        let fetched = coord.get(&record.tx_id, 1100).unwrap();
        assert_eq!(fetched.operation_type, "upload");
    }

    #[test]
    fn expired_entry_is_not_found() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let coord = PendingTxCoordinator::new(db);
        let w = wallet();
        let record = coord.store(&w, "upload", "0xdead".into(), json!({}), 1000, Some(60)).unwrap();
        let err = coord.get(&record.tx_id, 1100).unwrap_err();
        assert!(matches!(err, FuseVaultError::PendingTxNotFound(_)));
    }

    #[test]
    fn purge_expired_removes_only_expired() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let coord = PendingTxCoordinator::new(db);
        let w = wallet();
        coord.store(&w, "upload", "0xdead".into(), json!({}), 1000, Some(60)).unwrap();
        coord.store(&w, "upload", "0xbeef".into(), json!({}), 5000, Some(6000)).unwrap();
        let purged = coord.purge_expired(1100).unwrap();
        assert_eq!(purged, 1);
        assert_eq!(coord.stats(1100).unwrap().total, 1);
    }
}
