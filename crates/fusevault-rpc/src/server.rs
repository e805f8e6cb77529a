use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use fusevault_auth::dispatch::{dispatch, AuthContext};
use fusevault_auth::ApiKeyAuthenticator;
use fusevault_core::constants::API_KEY_DEFAULT_RATE_LIMIT_PER_MINUTE;
use fusevault_core::error::{ErrorKind, FuseVaultError};
use fusevault_core::model::{AssetVersionRecord, Permission, TransactionRecord};
use fusevault_core::types::{AssetId, TxHash, WalletAddress};
use fusevault_crypto::api_key::{generate_api_key, key_hash};
use fusevault_orchestrator::{
    complete_delete, complete_set_delegate, complete_upload, delete, delete_batch, retrieve_metadata,
    set_delegate, upload, upload_batch, DeleteInput, DeleteStatus, OrchestratorCtx, Outcome, UploadInput,
};
use fusevault_store::{ApiKeyStore, RateLimiter};

use crate::api::FuseVaultApiServer;
use crate::types::{
    RpcApiKeyCreated, RpcApiKeyInfo, RpcAssetVersion, RpcCreateApiKeyRequest, RpcDelegation,
    RpcDeleteResult, RpcOutcome, RpcPendingTx, RpcPendingTxInfo, RpcReceipt, RpcRetrieveResult,
    RpcTransaction, RpcUploadRequest, RpcVerificationVerdict,
};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

/// Maps the shared error taxonomy onto JSON-RPC codes. Standard
/// `-32602`/`-32603` are reserved for invalid params and internal errors;
/// the application-specific range above `-32000` carries the rest so a
/// client can distinguish "retry" (rate-limited, dependency down) from
/// "don't retry" (not found, conflict) without string-matching messages.
fn map_err(err: FuseVaultError) -> ErrorObject<'static> {
    let code = match err.kind() {
        ErrorKind::Validation => -32602,
        ErrorKind::Authorization => -32001,
        ErrorKind::NotFound => -32002,
        ErrorKind::Conflict => -32003,
        ErrorKind::RateLimited => -32004,
        ErrorKind::DependencyUnavailable => -32005,
        ErrorKind::Internal => -32603,
    };
    rpc_err(code, err.to_string())
}

fn parse_wallet(s: &str) -> Result<WalletAddress, FuseVaultError> {
    WalletAddress::parse(s).map_err(|e| FuseVaultError::Validation(e.to_string()))
}

fn parse_permission(s: &str) -> Result<Permission, FuseVaultError> {
    match s {
        "read" => Ok(Permission::Read),
        "write" => Ok(Permission::Write),
        "delete" => Ok(Permission::Delete),
        other => Err(FuseVaultError::Validation(format!("unknown permission: {other}"))),
    }
}

fn permission_str(p: Permission) -> &'static str {
    match p {
        Permission::Read => "read",
        Permission::Write => "write",
        Permission::Delete => "delete",
    }
}

fn action_str(action: fusevault_core::model::Action) -> String {
    format!("{:?}", action)
}

fn record_to_rpc(r: AssetVersionRecord, action: fusevault_core::model::Action) -> RpcAssetVersion {
    RpcAssetVersion {
        asset_id: r.asset_id.to_string(),
        owner_address: r.owner_address.to_string(),
        version_number: r.version_number,
        ipfs_version: r.ipfs_version,
        critical_metadata: r.critical_metadata,
        non_critical_metadata: r.non_critical_metadata,
        ipfs_hash: r.ipfs_hash.to_string(),
        chain_tx_id: r.chain_tx_id.to_string(),
        is_current: r.is_current,
        is_deleted: r.is_deleted,
        deleted_by: r.deleted_by.map(|w| w.to_string()),
        deleted_at: r.deleted_at,
        previous_version_id: r.previous_version_id,
        document_history: r.document_history,
        performed_by: r.performed_by.to_string(),
        is_delegated_action: r.is_delegated_action,
        last_updated: r.last_updated,
        last_verified: r.last_verified,
        action: action_str(action),
    }
}

fn pending_to_rpc(handle: fusevault_orchestrator::PendingTxHandle) -> RpcPendingTx {
    RpcPendingTx {
        pending_tx_id: handle.pending_tx_id,
        transaction_hex: handle.transaction_hex,
        estimated_gas: handle.estimated_gas,
        gas_price_wei: handle.gas_price_wei.to_string(),
        function_name: handle.function_name.to_string(),
    }
}

fn receipt_to_rpc(r: fusevault_chain::ReceiptSummary) -> RpcReceipt {
    RpcReceipt { tx_hash: r.tx_hash.to_string(), gas_used: r.gas_used, status: r.status }
}

fn transaction_to_rpc(t: TransactionRecord) -> RpcTransaction {
    RpcTransaction {
        asset_id: t.asset_id.to_string(),
        action: action_str(t.action),
        wallet_address: t.wallet_address.to_string(),
        performed_by: t.performed_by.to_string(),
        timestamp: t.timestamp,
        metadata: t.metadata,
    }
}

fn delegation_to_rpc(d: fusevault_core::model::DelegationRecord) -> RpcDelegation {
    RpcDelegation {
        owner_address: d.owner_address.to_string(),
        delegate_address: d.delegate_address.to_string(),
        is_active: d.is_active,
        last_tx_hash: d.last_tx_hash.map(|t| t.to_string()),
        block_number: d.block_number,
        updated_at: d.updated_at,
    }
}

fn verdict_to_rpc(v: fusevault_orchestrator::VerificationVerdict) -> RpcVerificationVerdict {
    RpcVerificationVerdict {
        ipfs_hash_verified: v.ipfs_hash_verified,
        cid_match: v.cid_match,
        tx_sender_verified: v.tx_sender_verified,
        deletion_status_tampered: v.deletion_status_tampered,
        verified: v.verified,
        recovery_attempted: v.recovery_attempted,
        recovery_successful: v.recovery_successful,
    }
}

fn delete_status_str(s: DeleteStatus) -> String {
    match s {
        DeleteStatus::Deleted => "deleted".to_string(),
        DeleteStatus::Synced => "synced".to_string(),
        DeleteStatus::AlreadyDeleted => "already_deleted".to_string(),
    }
}

fn upload_outcome_to_rpc(outcome: Outcome<fusevault_orchestrator::UploadResult>) -> RpcOutcome<RpcAssetVersion> {
    match outcome {
        Outcome::Done(result) => RpcOutcome::Done(record_to_rpc(result.record, result.action)),
        Outcome::PendingSignature(handle) => RpcOutcome::PendingSignature { pending: pending_to_rpc(handle) },
    }
}

fn delete_outcome_to_rpc(outcome: Outcome<fusevault_orchestrator::DeleteResult>) -> RpcOutcome<RpcDeleteResult> {
    match outcome {
        Outcome::Done(result) => RpcOutcome::Done(RpcDeleteResult {
            asset_id: result.asset_id.to_string(),
            status: delete_status_str(result.status),
        }),
        Outcome::PendingSignature(handle) => RpcOutcome::PendingSignature { pending: pending_to_rpc(handle) },
    }
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub orchestrator: Arc<OrchestratorCtx>,
    pub api_keys: Arc<ApiKeyStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub api_key_secret: Vec<u8>,
    pub api_key_auth_enabled: bool,
    pub api_key_rate_limit_per_minute: u64,
}

impl RpcServerState {
    fn authenticator(&self) -> ApiKeyAuthenticator<'_> {
        ApiKeyAuthenticator::new(&self.api_keys, &self.rate_limiter, &self.api_key_secret)
            .with_rate_limit_per_minute(
                if self.api_key_rate_limit_per_minute == 0 {
                    API_KEY_DEFAULT_RATE_LIMIT_PER_MINUTE
                } else {
                    self.api_key_rate_limit_per_minute
                },
            )
    }

    /// Resolves the caller's `AuthContext` per §4.8, rejecting with
    /// `Unauthenticated` when neither a session wallet nor a usable API key
    /// is present.
    fn authenticate(
        &self,
        session_wallet: Option<String>,
        api_key: Option<String>,
        now: i64,
    ) -> Result<AuthContext, FuseVaultError> {
        let wallet = session_wallet.as_deref().map(parse_wallet).transpose()?;
        let authenticator = self.authenticator();
        dispatch(wallet.as_ref(), api_key.as_deref(), self.api_key_auth_enabled, &authenticator, now)?
            .ok_or(FuseVaultError::Unauthenticated)
    }
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Session/HTTP routing beyond this is out of scope (§10 Non-goal) —
    /// the caller's reverse proxy owns TLS and cookie-based session auth.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl FuseVaultApiServer for RpcServer {
    async fn upload_asset(
        &self,
        request: RpcUploadRequest,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcOutcome<RpcAssetVersion>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        if !auth.has_permission(Permission::Write) {
            return Err(rpc_err(-32001, "missing write permission"));
        }

        let owner = parse_wallet(&request.owner).map_err(map_err)?;
        let input = UploadInput {
            asset_id: AssetId::new(request.asset_id),
            owner,
            initiator: auth.wallet_address.clone(),
            critical: request.critical_metadata,
            non_critical: request.non_critical_metadata,
        };

        let outcome = upload(&self.state.orchestrator, input, &auth, now).await.map_err(map_err)?;
        Ok(upload_outcome_to_rpc(outcome))
    }

    async fn upload_asset_batch(
        &self,
        requests: Vec<RpcUploadRequest>,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcOutcome<RpcAssetVersion>>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        if !auth.has_permission(Permission::Write) {
            return Err(rpc_err(-32001, "missing write permission"));
        }

        let mut inputs = Vec::with_capacity(requests.len());
        for request in requests {
            let owner = parse_wallet(&request.owner).map_err(map_err)?;
            inputs.push(UploadInput {
                asset_id: AssetId::new(request.asset_id),
                owner,
                initiator: auth.wallet_address.clone(),
                critical: request.critical_metadata,
                non_critical: request.non_critical_metadata,
            });
        }

        let outcomes = upload_batch(self.state.orchestrator.clone(), inputs, &auth, now)
            .await
            .map_err(map_err)?;
        Ok(outcomes.into_iter().map(upload_outcome_to_rpc).collect())
    }

    async fn retrieve_asset(
        &self,
        asset_id: String,
        version: Option<u32>,
        auto_recover: bool,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcRetrieveResult> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        if !auth.has_permission(Permission::Read) {
            return Err(rpc_err(-32001, "missing read permission"));
        }

        let asset_id = AssetId::new(asset_id);
        let result = retrieve_metadata(&self.state.orchestrator, &asset_id, version, auto_recover, now, None)
            .await
            .map_err(map_err)?;
        // retrieve is a read, not a logged action (§9 Open Question decision:
        // VERIFY is never written to the transaction log); the DTO's
        // `action` field reports it as such for the caller's display purposes.
        Ok(RpcRetrieveResult {
            record: record_to_rpc(result.record, fusevault_core::model::Action::Verify),
            verdict: verdict_to_rpc(result.verdict),
        })
    }

    async fn delete_asset(
        &self,
        asset_id: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcOutcome<RpcDeleteResult>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        if !auth.has_permission(Permission::Delete) {
            return Err(rpc_err(-32001, "missing delete permission"));
        }

        let input = DeleteInput { asset_id: AssetId::new(asset_id), initiator: auth.wallet_address.clone(), reason: None };
        let outcome = delete(&self.state.orchestrator, input, &auth, now).await.map_err(map_err)?;
        Ok(delete_outcome_to_rpc(outcome))
    }

    async fn delete_asset_batch(
        &self,
        asset_ids: Vec<String>,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcOutcome<RpcDeleteResult>>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        if !auth.has_permission(Permission::Delete) {
            return Err(rpc_err(-32001, "missing delete permission"));
        }

        let ids = asset_ids.into_iter().map(AssetId::new).collect();
        let initiator = auth.wallet_address.clone();
        let outcome = delete_batch(&self.state.orchestrator, ids, initiator, None, &auth, now)
            .await
            .map_err(map_err)?;
        match outcome {
            Outcome::Done(results) => Ok(results
                .into_iter()
                .map(|r| RpcOutcome::Done(RpcDeleteResult { asset_id: r.asset_id.to_string(), status: delete_status_str(r.status) }))
                .collect()),
            Outcome::PendingSignature(handle) => Ok(vec![RpcOutcome::PendingSignature { pending: pending_to_rpc(handle) }]),
        }
    }

    async fn complete_pending_transaction(
        &self,
        pending_tx_id: String,
        blockchain_tx_hash: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Value> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        let tx_hash = TxHash::parse(&blockchain_tx_hash).map_err(|e| rpc_err(-32602, e.to_string()))?;

        let pending = self.state.orchestrator.pending.get(&pending_tx_id, now).map_err(map_err)?;
        if pending.initiator_address != auth.wallet_address {
            return Err(rpc_err(-32001, "pending transaction belongs to a different wallet"));
        }

        match pending.operation_type.as_str() {
            "upload" | "upload_batch" => {
                let result = complete_upload(&self.state.orchestrator, &pending_tx_id, &tx_hash, now)
                    .await
                    .map_err(map_err)?;
                Ok(json!({"operation": "upload", "result": record_to_rpc(result.record, result.action)}))
            }
            "delete" | "delete_batch" => {
                let results = complete_delete(&self.state.orchestrator, &pending_tx_id, &tx_hash, now)
                    .await
                    .map_err(map_err)?;
                let results: Vec<_> = results
                    .into_iter()
                    .map(|r| json!({"asset_id": r.asset_id.to_string(), "status": delete_status_str(r.status)}))
                    .collect();
                Ok(json!({"operation": "delete", "result": results}))
            }
            "set_delegate" => {
                let receipt = complete_set_delegate(&self.state.orchestrator, &pending_tx_id, &tx_hash, now)
                    .await
                    .map_err(map_err)?;
                Ok(json!({"operation": "set_delegate", "result": receipt_to_rpc(receipt)}))
            }
            other => Err(rpc_err(-32603, format!("unknown pending operation type: {other}"))),
        }
    }

    async fn list_transactions(
        &self,
        asset_id: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcTransaction>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        if !auth.has_permission(Permission::Read) {
            return Err(rpc_err(-32001, "missing read permission"));
        }

        let records = self.state.orchestrator.txlog.list_by_asset(&AssetId::new(asset_id)).map_err(map_err)?;
        Ok(records.into_iter().map(transaction_to_rpc).collect())
    }

    async fn list_pending_transactions(
        &self,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcPendingTxInfo>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;

        let records = self.state.orchestrator.pending.list_by_user(&auth.wallet_address, now).map_err(map_err)?;
        Ok(records
            .into_iter()
            .map(|r| RpcPendingTxInfo {
                tx_id: r.tx_id,
                initiator_address: r.initiator_address.to_string(),
                operation_type: r.operation_type,
                created_at: r.created_at,
                ttl_secs: r.ttl_secs,
            })
            .collect())
    }

    async fn set_delegate(
        &self,
        owner: String,
        delegate: String,
        status: bool,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<RpcOutcome<RpcReceipt>> {
        let now = now_ts();
        let auth = self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        let owner = parse_wallet(&owner).map_err(map_err)?;
        let delegate = parse_wallet(&delegate).map_err(map_err)?;

        let outcome = set_delegate(&self.state.orchestrator, &owner, &delegate, status, &auth, now)
            .await
            .map_err(map_err)?;
        Ok(match outcome {
            Outcome::Done(receipt) => RpcOutcome::Done(receipt_to_rpc(receipt)),
            Outcome::PendingSignature(handle) => RpcOutcome::PendingSignature { pending: pending_to_rpc(handle) },
        })
    }

    async fn list_delegates(
        &self,
        owner: String,
        session_wallet: Option<String>,
        api_key: Option<String>,
    ) -> RpcResult<Vec<RpcDelegation>> {
        let now = now_ts();
        self.state.authenticate(session_wallet, api_key, now).map_err(map_err)?;
        let owner = parse_wallet(&owner).map_err(map_err)?;

        let records = self.state.orchestrator.delegation.list_for_owner(&owner).map_err(map_err)?;
        Ok(records.into_iter().map(delegation_to_rpc).collect())
    }

    async fn create_api_key(
        &self,
        request: RpcCreateApiKeyRequest,
        session_wallet: Option<String>,
    ) -> RpcResult<RpcApiKeyCreated> {
        let now = now_ts();
        // API-key issuance is itself a wallet-auth-only action — an API key
        // cannot mint another API key on its own behalf.
        let wallet = session_wallet.ok_or_else(|| rpc_err(-32001, "API key creation requires a wallet-signed session"))?;
        let wallet = parse_wallet(&wallet).map_err(map_err)?;
        let requested_wallet = parse_wallet(&request.wallet_address).map_err(map_err)?;
        if wallet != requested_wallet {
            return Err(rpc_err(-32001, "may not create API keys for another wallet"));
        }

        let permissions: Vec<Permission> = request
            .permissions
            .iter()
            .map(|s| parse_permission(s))
            .collect::<Result<_, _>>()
            .map_err(map_err)?;

        let full_key = generate_api_key(wallet.tag8(), &self.state.api_key_secret);
        let hash = key_hash(&full_key);

        self.state
            .api_keys
            .insert(fusevault_core::model::ApiKeyRecord {
                key_hash: hash,
                wallet_address: wallet.clone(),
                name: request.name.clone(),
                permissions: permissions.clone(),
                expires_at: request.expires_at,
                created_at: now,
                last_used_at: None,
                is_active: true,
                metadata: Value::Null,
            })
            .map_err(map_err)?;

        Ok(RpcApiKeyCreated {
            api_key: full_key,
            wallet_address: wallet.to_string(),
            name: request.name,
            permissions: permissions.into_iter().map(|p| permission_str(p).to_string()).collect(),
            expires_at: request.expires_at,
        })
    }

    async fn list_api_keys(
        &self,
        wallet_address: String,
        session_wallet: Option<String>,
    ) -> RpcResult<Vec<RpcApiKeyInfo>> {
        let wallet = session_wallet.ok_or_else(|| rpc_err(-32001, "requires a wallet-signed session"))?;
        let wallet = parse_wallet(&wallet).map_err(map_err)?;
        let requested_wallet = parse_wallet(&wallet_address).map_err(map_err)?;
        if wallet != requested_wallet {
            return Err(rpc_err(-32001, "may not list API keys for another wallet"));
        }

        let records = self.state.api_keys.list_by_wallet(&wallet).map_err(map_err)?;
        Ok(records
            .into_iter()
            .map(|r| RpcApiKeyInfo {
                key_hash: hex::encode(r.key_hash),
                wallet_address: r.wallet_address.to_string(),
                name: r.name,
                permissions: r.permissions.into_iter().map(|p| permission_str(p).to_string()).collect(),
                expires_at: r.expires_at,
                created_at: r.created_at,
                last_used_at: r.last_used_at,
                is_active: r.is_active,
            })
            .collect())
    }

    async fn revoke_api_key(&self, key_hash: String, session_wallet: Option<String>) -> RpcResult<bool> {
        let wallet = session_wallet.ok_or_else(|| rpc_err(-32001, "requires a wallet-signed session"))?;
        let wallet = parse_wallet(&wallet).map_err(map_err)?;

        let hash_bytes = hex::decode(&key_hash).map_err(|e| rpc_err(-32602, format!("invalid key hash: {e}")))?;
        let hash: [u8; 32] = hash_bytes
            .try_into()
            .map_err(|_| rpc_err(-32602, "key hash must be 32 bytes"))?;

        let records = self.state.api_keys.list_by_wallet(&wallet).map_err(map_err)?;
        if !records.iter().any(|r| r.key_hash == hash) {
            return Err(rpc_err(-32001, "may not revoke another wallet's API key"));
        }

        self.state.api_keys.revoke(&hash).map_err(map_err)?;
        Ok(true)
    }
}
