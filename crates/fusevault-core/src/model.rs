//! The persistent record shapes of §3. These are constructed only by
//! orchestrators in `fusevault-orchestrator`; every other crate treats them
//! as plain data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AssetId, Cid, IpfsVersion, Timestamp, TxHash, VersionNumber, WalletAddress};

/// A single point-in-time snapshot of an asset. Versions are never mutated,
/// only superseded — see invariant 2 in §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetVersionRecord {
    pub asset_id: AssetId,
    pub owner_address: WalletAddress,
    pub version_number: VersionNumber,
    pub ipfs_version: IpfsVersion,
    pub critical_metadata: Value,
    pub non_critical_metadata: Value,
    pub ipfs_hash: Cid,
    pub chain_tx_id: TxHash,
    pub is_current: bool,
    pub is_deleted: bool,
    pub deleted_by: Option<WalletAddress>,
    pub deleted_at: Option<Timestamp>,
    pub previous_version_id: Option<VersionNumber>,
    /// Denormalized closure of every prior version number, enabling O(1)
    /// history reads without walking `previous_version_id` links.
    pub document_history: Vec<VersionNumber>,
    pub performed_by: WalletAddress,
    pub is_delegated_action: bool,
    pub last_updated: Timestamp,
    pub last_verified: Option<Timestamp>,
}

/// The enumerated, closed action set a transaction record may carry.
/// `RecreateDeleted` is kept distinct from `Create`/`VersionCreate` — see the
/// Open Question decision recorded in DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    RecreateDeleted,
    Update,
    VersionCreate,
    Delete,
    Verify,
    IntegrityRecovery,
    DeletionStatusRestored,
    TransferInitiated,
    TransferCompleted,
    TransferCancelled,
}

/// An append-only audit record of a state-changing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub asset_id: AssetId,
    pub action: Action,
    pub wallet_address: WalletAddress,
    pub performed_by: WalletAddress,
    pub timestamp: Timestamp,
    pub metadata: Value,
}

/// A stored, TTL'd unsigned transaction awaiting a user's signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTxRecord {
    pub tx_id: String,
    pub initiator_address: WalletAddress,
    pub operation_type: String,
    /// Hex-encoded unsigned transaction bytes.
    pub unsigned_tx_hex: String,
    /// Inputs needed to resume the orchestrator at completion time
    /// (asset IDs, already-uploaded IPFS results, etc).
    pub resume_data: Value,
    pub created_at: Timestamp,
    pub ttl_secs: u64,
}

impl PendingTxRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.created_at) as u64 >= self.ttl_secs
    }
}

/// One of {read, write, delete}. Kept as a small closed set rather than a
/// free-form string so permission checks are exhaustive matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// SHA256 of the full key string form; unique.
    pub key_hash: [u8; 32],
    pub wallet_address: WalletAddress,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub last_used_at: Option<Timestamp>,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: Value,
}

/// A cached on-chain delegate relationship. The chain is always the source
/// of truth; this cache is consulted for UX listing only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub owner_address: WalletAddress,
    pub delegate_address: WalletAddress,
    pub is_active: bool,
    pub last_tx_hash: Option<TxHash>,
    pub block_number: Option<u64>,
    pub updated_at: Timestamp,
}
