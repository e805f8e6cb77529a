//! fusevault-rpc
//!
//! JSON-RPC 2.0 server for FuseVault nodes.
//!
//! Namespace: "fusevault"
//! Methods:
//!   fusevault_uploadAsset              — create or update an asset (may return pending_signature)
//!   fusevault_uploadAssetBatch         — upload multiple assets concurrently
//!   fusevault_retrieveAsset            — fetch + verify (+ auto-recover) a version
//!   fusevault_deleteAsset              — soft-delete an asset (may return pending_signature)
//!   fusevault_deleteAssetBatch         — soft-delete multiple assets concurrently
//!   fusevault_completePendingTransaction — resume a wallet-signed transaction by pending id
//!   fusevault_listTransactions         — transaction log for an asset
//!   fusevault_listPendingTransactions  — outstanding pending transactions for a wallet
//!   fusevault_setDelegate              — grant/revoke a delegate (wallet-auth only)
//!   fusevault_listDelegates            — delegates registered for an owner
//!   fusevault_createApiKey             — issue a new API key
//!   fusevault_listApiKeys              — list API keys for a wallet
//!   fusevault_revokeApiKey             — deactivate an API key

pub mod api;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerState};
pub use types::{
    RpcApiKeyCreated, RpcApiKeyInfo, RpcAssetVersion, RpcAuth, RpcCreateApiKeyRequest,
    RpcDelegation, RpcDeleteResult, RpcOutcome, RpcPendingTx, RpcPendingTxInfo, RpcReceipt,
    RpcRetrieveResult, RpcTransaction, RpcUploadRequest, RpcVerificationVerdict,
};
