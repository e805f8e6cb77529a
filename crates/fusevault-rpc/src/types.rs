use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `uploadAsset`/`uploadAssetBatch`. The initiator is never
/// taken from this body — it is always the authenticated caller, so a
/// delegate acts under their own identity rather than one they merely claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcUploadRequest {
    pub asset_id: String,
    pub owner: String,
    pub critical_metadata: Value,
    #[serde(default)]
    pub non_critical_metadata: Value,
}

/// JSON-serializable view of an `AssetVersionRecord` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcAssetVersion {
    pub asset_id: String,
    pub owner_address: String,
    pub version_number: u32,
    pub ipfs_version: u32,
    pub critical_metadata: Value,
    pub non_critical_metadata: Value,
    pub ipfs_hash: String,
    pub chain_tx_id: String,
    pub is_current: bool,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<i64>,
    pub previous_version_id: Option<u32>,
    pub document_history: Vec<u32>,
    pub performed_by: String,
    pub is_delegated_action: bool,
    pub last_updated: i64,
    pub last_verified: Option<i64>,
    pub action: String,
}

/// An unsigned transaction handed back to a wallet-auth caller, hex-encoded
/// and ready to sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPendingTx {
    pub pending_tx_id: String,
    pub transaction_hex: String,
    pub estimated_gas: u64,
    pub gas_price_wei: String,
    pub function_name: String,
}

/// The `{ok | pending_signature}` tagged result the distilled spec
/// describes (§9), serialized with an explicit `status` discriminant
/// rather than folded into `Outcome<T>`'s Rust-only shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcOutcome<T> {
    Done(T),
    PendingSignature { pending: RpcPendingTx },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDeleteResult {
    pub asset_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcVerificationVerdict {
    pub ipfs_hash_verified: bool,
    pub cid_match: bool,
    pub tx_sender_verified: bool,
    pub deletion_status_tampered: bool,
    pub verified: bool,
    pub recovery_attempted: bool,
    pub recovery_successful: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRetrieveResult {
    pub record: RpcAssetVersion,
    pub verdict: RpcVerificationVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub asset_id: String,
    pub action: String,
    pub wallet_address: String,
    pub performed_by: String,
    pub timestamp: i64,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDelegation {
    pub owner_address: String,
    pub delegate_address: String,
    pub is_active: bool,
    pub last_tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReceipt {
    pub tx_hash: String,
    pub gas_used: u64,
    pub status: bool,
}

/// A stored pending transaction awaiting a wallet signature, as returned by
/// `listPendingTransactions` — distinct from `RpcPendingTx`, which is the
/// freshly-built handle an upload/delete/setDelegate call just produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPendingTxInfo {
    pub tx_id: String,
    pub initiator_address: String,
    pub operation_type: String,
    pub created_at: i64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCreateApiKeyRequest {
    pub wallet_address: String,
    pub name: String,
    /// Each entry one of "read", "write", "delete".
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
}

/// The full key string is returned exactly once, at creation — callers must
/// store it themselves, matching the original's "shown once" semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcApiKeyCreated {
    pub api_key: String,
    pub wallet_address: String,
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcApiKeyInfo {
    pub key_hash: String,
    pub wallet_address: String,
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub is_active: bool,
}

/// Carries the (already-resolved) caller identity across the typed seam —
/// this crate never parses cookies or headers itself (§4.8 Non-goal), it
/// only dispatches between a validated session wallet and an API key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcAuth {
    pub session_wallet: Option<String>,
    pub api_key: Option<String>,
}
