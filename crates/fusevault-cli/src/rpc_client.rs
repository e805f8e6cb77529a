use anyhow::{bail, Context};
use serde_json::{json, Value};

use fusevault_rpc::{
    RpcApiKeyCreated, RpcApiKeyInfo, RpcAssetVersion, RpcCreateApiKeyRequest, RpcDelegation,
    RpcDeleteResult, RpcOutcome, RpcPendingTxInfo, RpcReceipt, RpcRetrieveResult, RpcTransaction,
    RpcUploadRequest,
};

/// Simple JSON-RPC 2.0 client used by the CLI to talk to a running node.
///
/// Uses raw HTTP POST with serde_json rather than the full jsonrpsee client
/// to keep this binary lean.
pub struct FuseVaultRpcClient {
    url: String,
    client: reqwest::Client,
    session_wallet: Option<String>,
    api_key: Option<String>,
}

impl FuseVaultRpcClient {
    pub fn new(url: &str, session_wallet: Option<String>, api_key: Option<String>) -> Self {
        Self { url: url.to_string(), client: reqwest::Client::new(), session_wallet, api_key }
    }

    /// Call a JSON-RPC method and return the `result` field.
    async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;

        let json: Value = resp.json().await.context("parsing RPC response")?;

        if let Some(err) = json.get("error") {
            bail!("RPC error: {}", err);
        }

        Ok(json["result"].clone())
    }

    fn parse<T: serde::de::DeserializeOwned>(result: Value) -> anyhow::Result<T> {
        serde_json::from_value(result).context("parsing RPC result")
    }

    fn auth_params(&self) -> (Value, Value) {
        (
            self.session_wallet.clone().map(Value::String).unwrap_or(Value::Null),
            self.api_key.clone().map(Value::String).unwrap_or(Value::Null),
        )
    }

    pub async fn upload_asset(&self, request: RpcUploadRequest) -> anyhow::Result<RpcOutcome<RpcAssetVersion>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_uploadAsset", json!([request, w, k])).await?;
        Self::parse(result)
    }

    pub async fn upload_asset_batch(&self, requests: Vec<RpcUploadRequest>) -> anyhow::Result<Vec<RpcOutcome<RpcAssetVersion>>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_uploadAssetBatch", json!([requests, w, k])).await?;
        Self::parse(result)
    }

    pub async fn retrieve_asset(&self, asset_id: &str, version: Option<u32>, auto_recover: bool) -> anyhow::Result<RpcRetrieveResult> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_retrieveAsset", json!([asset_id, version, auto_recover, w, k])).await?;
        Self::parse(result)
    }

    pub async fn delete_asset(&self, asset_id: &str) -> anyhow::Result<RpcOutcome<RpcDeleteResult>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_deleteAsset", json!([asset_id, w, k])).await?;
        Self::parse(result)
    }

    pub async fn delete_asset_batch(&self, asset_ids: &[String]) -> anyhow::Result<Vec<RpcOutcome<RpcDeleteResult>>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_deleteAssetBatch", json!([asset_ids, w, k])).await?;
        Self::parse(result)
    }

    pub async fn complete_pending_transaction(&self, pending_tx_id: &str, blockchain_tx_hash: &str) -> anyhow::Result<Value> {
        let (w, k) = self.auth_params();
        self.call("fusevault_completePendingTransaction", json!([pending_tx_id, blockchain_tx_hash, w, k])).await
    }

    pub async fn list_transactions(&self, asset_id: &str) -> anyhow::Result<Vec<RpcTransaction>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_listTransactions", json!([asset_id, w, k])).await?;
        Self::parse(result)
    }

    pub async fn list_pending_transactions(&self) -> anyhow::Result<Vec<RpcPendingTxInfo>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_listPendingTransactions", json!([w, k])).await?;
        Self::parse(result)
    }

    pub async fn set_delegate(&self, owner: &str, delegate: &str, status: bool) -> anyhow::Result<RpcOutcome<RpcReceipt>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_setDelegate", json!([owner, delegate, status, w, k])).await?;
        Self::parse(result)
    }

    pub async fn list_delegates(&self, owner: &str) -> anyhow::Result<Vec<RpcDelegation>> {
        let (w, k) = self.auth_params();
        let result = self.call("fusevault_listDelegates", json!([owner, w, k])).await?;
        Self::parse(result)
    }

    pub async fn create_api_key(&self, request: RpcCreateApiKeyRequest) -> anyhow::Result<RpcApiKeyCreated> {
        let (w, _k) = self.auth_params();
        let result = self.call("fusevault_createApiKey", json!([request, w])).await?;
        Self::parse(result)
    }

    pub async fn list_api_keys(&self, wallet_address: &str) -> anyhow::Result<Vec<RpcApiKeyInfo>> {
        let (w, _k) = self.auth_params();
        let result = self.call("fusevault_listApiKeys", json!([wallet_address, w])).await?;
        Self::parse(result)
    }

    pub async fn revoke_api_key(&self, key_hash: &str) -> anyhow::Result<bool> {
        let (w, _k) = self.auth_params();
        let result = self.call("fusevault_revokeApiKey", json!([key_hash, w])).await?;
        Self::parse(result)
    }
}

