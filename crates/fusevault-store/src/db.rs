//! Persistent state database backed by sled.
//!
//! Named trees:
//!   asset_versions  — `{asset_id}\0{version:010}` → bincode(AssetVersionRecord)
//!   asset_current   — asset_id utf8           → version_number be bytes
//!   transactions     — `{asset_id}\0{seq:020}`    → bincode(TransactionRecord)
//!   pending_txs      — tx_id utf8               → bincode(PendingTxRecord)
//!   delegations      — `{owner}\0{delegate}`      → bincode(DelegationRecord)
//!   api_keys         — key_hash bytes           → bincode(ApiKeyRecord)
//!   rate_limit       — `{wallet}\0{bucket:020}`   → count be bytes
//!   meta             — utf8 key                 → raw bytes

use std::path::Path;

use fusevault_core::error::FuseVaultError;

pub struct StoreDb {
    pub(crate) _db: sled::Db,
    pub(crate) asset_versions: sled::Tree,
    pub(crate) asset_current: sled::Tree,
    pub(crate) transactions: sled::Tree,
    pub(crate) pending_txs: sled::Tree,
    pub(crate) delegations: sled::Tree,
    pub(crate) api_keys: sled::Tree,
    pub(crate) rate_limit: sled::Tree,
    pub(crate) meta: sled::Tree,
}

impl StoreDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FuseVaultError> {
        let db = sled::open(path).map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        let open = |name: &str| -> Result<sled::Tree, FuseVaultError> {
            db.open_tree(name).map_err(|e| FuseVaultError::Storage(e.to_string()))
        };
        Ok(Self {
            asset_versions: open("asset_versions")?,
            asset_current: open("asset_current")?,
            transactions: open("transactions")?,
            pending_txs: open("pending_txs")?,
            delegations: open("delegations")?,
            api_keys: open("api_keys")?,
            rate_limit: open("rate_limit")?,
            meta: open("meta")?,
            _db: db,
        })
    }

    /// Opens a temporary, process-local database. Used by tests.
    pub fn open_temporary() -> Result<Self, FuseVaultError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        let open = |name: &str| -> Result<sled::Tree, FuseVaultError> {
            db.open_tree(name).map_err(|e| FuseVaultError::Storage(e.to_string()))
        };
        Ok(Self {
            asset_versions: open("asset_versions")?,
            asset_current: open("asset_current")?,
            transactions: open("transactions")?,
            pending_txs: open("pending_txs")?,
            delegations: open("delegations")?,
            api_keys: open("api_keys")?,
            rate_limit: open("rate_limit")?,
            meta: open("meta")?,
            _db: db,
        })
    }

    pub fn flush(&self) -> Result<(), FuseVaultError> {
        self._db.flush().map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Allocates the next sequential transaction-log sequence number.
    pub(crate) fn next_tx_seq(&self) -> Result<u64, FuseVaultError> {
        let key = b"next_tx_seq";
        let current = self
            .meta
            .get(key)
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0);
        self.meta
            .insert(key, &(current + 1).to_be_bytes())
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        Ok(current)
    }
}

/// Encodes a compound `asset_versions` key so lexicographic byte order equals
/// ascending version order.
pub(crate) fn version_key(asset_id: &str, version: u32) -> Vec<u8> {
    let mut key = asset_id.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(format!("{:010}", version).as_bytes());
    key
}

pub(crate) fn asset_prefix(asset_id: &str) -> Vec<u8> {
    let mut key = asset_id.as_bytes().to_vec();
    key.push(0);
    key
}

pub(crate) fn tx_key(seq: u64) -> Vec<u8> {
    format!("{:020}", seq).into_bytes()
}

pub(crate) fn delegation_key(owner: &str, delegate: &str) -> Vec<u8> {
    let mut key = owner.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(delegate.as_bytes());
    key
}

pub(crate) fn rate_limit_key(wallet: &str, bucket: u64) -> Vec<u8> {
    let mut key = wallet.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(format!("{:020}", bucket).as_bytes());
    key
}
