//! The append-only transaction log (§4.4). Every state-changing action is
//! recorded here; nothing is ever mutated or removed.

use std::sync::Arc;

use serde_json::Value;

use fusevault_core::error::FuseVaultError;
use fusevault_core::model::{Action, TransactionRecord};
use fusevault_core::types::{AssetId, Timestamp, WalletAddress};

use crate::db::{tx_key, StoreDb};

pub struct TransactionLog {
    db: Arc<StoreDb>,
}

impl TransactionLog {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    pub fn append(
        &self,
        asset_id: &AssetId,
        action: Action,
        wallet_address: &WalletAddress,
        performed_by: &WalletAddress,
        timestamp: Timestamp,
        metadata: Value,
    ) -> Result<(), FuseVaultError> {
        let record = TransactionRecord {
            asset_id: asset_id.clone(),
            action,
            wallet_address: wallet_address.clone(),
            performed_by: performed_by.clone(),
            timestamp,
            metadata,
        };
        let seq = self.db.next_tx_seq()?;
        let bytes = bincode::serialize(&record).map_err(|e| FuseVaultError::Serialization(e.to_string()))?;
        self.db
            .transactions
            .insert(tx_key(seq), bytes)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<TransactionRecord>, FuseVaultError> {
        let mut out = Vec::new();
        for item in self.db.transactions.iter() {
            let (_, bytes) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| FuseVaultError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    /// Every transaction touching `asset_id`, in append order.
    pub fn list_by_asset(&self, asset_id: &AssetId) -> Result<Vec<TransactionRecord>, FuseVaultError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.asset_id == *asset_id)
            .collect())
    }

    /// Every transaction performed by `wallet`, in append order.
    pub fn list_by_wallet(&self, wallet: &WalletAddress) -> Result<Vec<TransactionRecord>, FuseVaultError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.performed_by == *wallet)
            .collect())
    }

    /// Counts of each action kind for `asset_id`, used by audit summaries.
    pub fn summarize(&self, asset_id: &AssetId) -> Result<Vec<(Action, usize)>, FuseVaultError> {
        let mut counts: Vec<(Action, usize)> = Vec::new();
        for record in self.list_by_asset(asset_id)? {
            match counts.iter_mut().find(|(a, _)| *a == record.action) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.action, 1)),
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_list_by_asset() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let log = TransactionLog::new(db);
        let asset_id = AssetId::new("asset-1");
        let wallet = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        log.append(&asset_id, Action::Create, &wallet, &wallet, 100, Value::Null)
            .unwrap();
        log.append(&asset_id, Action::Verify, &wallet, &wallet, 200, Value::Null)
            .unwrap();
        let entries = log.list_by_asset(&asset_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, Action::Create);
        assert_eq!(entries[1].timestamp, 200);
    }

    #[test]
    fn summarize_counts_actions() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let log = TransactionLog::new(db);
        let asset_id = AssetId::new("asset-1");
        let wallet = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        log.append(&asset_id, Action::Verify, &wallet, &wallet, 1, Value::Null).unwrap();
        log.append(&asset_id, Action::Verify, &wallet, &wallet, 2, Value::Null).unwrap();
        let summary = log.summarize(&asset_id).unwrap();
        assert_eq!(summary, vec![(Action::Verify, 2)]);
    }
}
