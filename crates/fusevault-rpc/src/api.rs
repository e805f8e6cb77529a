use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcApiKeyCreated, RpcApiKeyInfo, RpcAssetVersion, RpcCreateApiKeyRequest, RpcDelegation,
    RpcDeleteResult, RpcOutcome, RpcPendingTxInfo, RpcReceipt, RpcRetrieveResult, RpcTransaction,
    RpcUploadRequest,
};

/// FuseVault JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "fusevault_" via `namespace = "fusevault"`.
/// `session_wallet`/`api_key` on every method are the already-validated
/// upstream session wallet and raw API key header; this crate resolves them
/// into an `AuthContext` itself rather than parsing sessions or HTTP headers.
#[rpc(server, namespace = "fusevault")]
pub trait FuseVaultApi {
    /// Create or update an asset. Returns a completed record for an
    /// owner-initiated, wallet-auth-unnecessary path, or a pending signature
    /// handle when the caller must broadcast the anchoring transaction
    /// themselves.
    #[method(name = "uploadAsset")]
    async fn upload_asset(
        &self,
        request: RpcUploadRequest,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcOutcome<RpcAssetVersion>>;

    /// Upload multiple assets concurrently. Each entry's outcome is reported
    /// independently; one failure does not abort the others.
    #[method(name = "uploadAssetBatch")]
    async fn upload_asset_batch(
        &self,
        requests: Vec<RpcUploadRequest>,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcOutcome<RpcAssetVersion>>>;

    /// Fetch the current (or a specific) version of an asset, verifying it
    /// against IPFS and on-chain evidence and auto-recovering divergence
    /// when `auto_recover` is set.
    #[method(name = "retrieveAsset")]
    async fn retrieve_asset(
        &self,
        asset_id: String,
        version: Option<u32>,
        auto_recover: bool,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcRetrieveResult>;

    /// Soft-delete an asset (all versions). Returns a pending signature
    /// handle when the initiator must broadcast the delete themselves.
    #[method(name = "deleteAsset")]
    async fn delete_asset(
        &self,
        asset_id: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcOutcome<RpcDeleteResult>>;

    /// Soft-delete multiple assets concurrently.
    #[method(name = "deleteAssetBatch")]
    async fn delete_asset_batch(
        &self,
        asset_ids: Vec<String>,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcOutcome<RpcDeleteResult>>>;

    /// Resume a wallet-signed upload, delete, or delegate-management
    /// transaction once the caller has broadcast it and it has a
    /// blockchain transaction hash. Returns the operation name alongside
    /// its JSON result, since each pending kind resumes to a different
    /// result shape.
    #[method(name = "completePendingTransaction")]
    async fn complete_pending_transaction(
        &self,
        pending_tx_id: String,
        blockchain_tx_hash: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<serde_json::Value>;

    /// Transaction log entries for an asset, oldest first.
    #[method(name = "listTransactions")]
    async fn list_transactions(
        &self,
        asset_id: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcTransaction>>;

    /// Outstanding pending transactions awaiting a wallet signature, for
    /// the calling wallet.
    #[method(name = "listPendingTransactions")]
    async fn list_pending_transactions(
        &self,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcPendingTxInfo>>;

    /// Grant or revoke a delegate for `owner`. Wallet-auth only; rejected
    /// outright for an API-key caller.
    #[method(name = "setDelegate")]
    async fn set_delegate(
        &self,
        owner: String,
        delegate: String,
        status: bool,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcOutcome<RpcReceipt>>;

    /// List delegates currently registered for an owner.
    #[method(name = "listDelegates")]
    async fn list_delegates(
        &self,
        owner: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcDelegation>>;

    /// Issue a new API key. The full key string is returned exactly once.
    #[method(name = "createApiKey")]
    async fn create_api_key(
        &self,
        request: RpcCreateApiKeyRequest,
        session_wallet: Option<String>,
    ) -> RpcResult<RpcApiKeyCreated>;

    /// List API keys registered to a wallet (hashes and metadata only).
    #[method(name = "listApiKeys")]
    async fn list_api_keys(
        &self,
        wallet_address: String,
        session_wallet: Option<String>,
    ) -> RpcResult<Vec<RpcApiKeyInfo>>;

    /// Deactivate an API key by its hash.
    #[method(name = "revokeApiKey")]
    async fn revoke_api_key(
        &self,
        key_hash: String,
        session_wallet: Option<String>,
    ) -> RpcResult<bool>;
}
