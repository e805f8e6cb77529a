use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use fusevault_core::constants::{CONTENT_STORE_TIMEOUT_SECS, RECOVERED_CONTENT_SENTINEL_BYTES};
use fusevault_core::error::FuseVaultError;
use fusevault_core::types::Cid;

/// A retrieved payload. Normally the caller's original JSON object; if the
/// bytes at a CID could not be decoded as JSON, a sentinel carrying the
/// first bytes verbatim so a failed-recovery transaction can still show
/// operators something (§4.1).
pub type RetrievedPayload = Value;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Uploads `payload` (already canonicalized by the caller) and returns
    /// its content identifier.
    async fn store(&self, payload: &[u8]) -> Result<Cid, FuseVaultError>;

    /// Computes the CID `payload` would get from `store`, without storing
    /// it. MUST be byte-for-byte consistent with `store` for the same input.
    async fn compute_cid(&self, payload: &[u8]) -> Result<Cid, FuseVaultError>;

    /// Retrieves and JSON-decodes the payload at `cid`, trying the
    /// configured gateway first and then the public fallbacks in order.
    async fn retrieve(&self, cid: &Cid) -> Result<RetrievedPayload, FuseVaultError>;
}

/// HTTP-backed content store client, grounded on the wallet's reqwest-based
/// JSON-RPC client shape but adapted to a multipart-upload/raw-fetch
/// protocol (see §6).
pub struct ContentStoreHttp {
    client: reqwest::Client,
    upload_base: String,
    fallback_gateways: Vec<String>,
}

impl ContentStoreHttp {
    pub fn new(upload_base: impl Into<String>, fallback_gateways: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_base: upload_base.into(),
            fallback_gateways,
        }
    }

    /// Default fallback chain per §4.1: the primary w3s.link gateway, then
    /// dweb.link.
    pub fn with_default_fallbacks(upload_base: impl Into<String>) -> Self {
        Self::new(upload_base, Vec::new())
    }

    fn gateway_url(gateway_template: &str, cid: &Cid) -> String {
        gateway_template.replace("{cid}", cid.as_str())
    }

    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, FuseVaultError> {
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(CONTENT_STORE_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| FuseVaultError::ContentStoreUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FuseVaultError::ContentStoreUnavailable(format!(
                "gateway returned status {}",
                resp.status()
            )));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FuseVaultError::ContentStoreUnavailable(e.to_string()))
    }

    /// Unwraps the upload endpoint's possibly-nested CID shape:
    /// `"cid"` or `{"/": "cid"}`.
    fn unwrap_cid_value(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("/").and_then(|x| x.as_str()).map(|s| s.to_string()),
            _ => None,
        }
    }

    fn decode_or_sentinel(bytes: &[u8]) -> RetrievedPayload {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v) => v,
            Err(e) => {
                let cut = bytes.len().min(RECOVERED_CONTENT_SENTINEL_BYTES);
                let recovered = String::from_utf8_lossy(&bytes[..cut]).to_string();
                json!({
                    "critical_metadata": { "recovered_content": recovered },
                    "retrieval_error": e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl ContentStore for ContentStoreHttp {
    async fn store(&self, payload: &[u8]) -> Result<Cid, FuseVaultError> {
        let part = reqwest::multipart::Part::bytes(payload.to_vec()).file_name("payload.json");
        let form = reqwest::multipart::Form::new().part("files", part);
        let resp = self
            .client
            .post(format!("{}/upload", self.upload_base))
            .multipart(form)
            .timeout(Duration::from_secs(CONTENT_STORE_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| FuseVaultError::ContentStoreUnavailable(e.to_string()))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| FuseVaultError::ContentStoreMalformed(e.to_string()))?;

        let cid_value = body
            .get("result")
            .and_then(|r| r.get("cids"))
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("cid"))
            .ok_or_else(|| FuseVaultError::ContentStoreMalformed("missing result.cids[0].cid".into()))?;

        let cid_str = Self::unwrap_cid_value(cid_value)
            .ok_or_else(|| FuseVaultError::ContentStoreMalformed("unrecognized cid shape".into()))?;

        Cid::new(cid_str).map_err(|e| FuseVaultError::ContentStoreMalformed(e.to_string()))
    }

    async fn compute_cid(&self, payload: &[u8]) -> Result<Cid, FuseVaultError> {
        let part = reqwest::multipart::Part::bytes(payload.to_vec()).file_name("payload.json");
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(format!("{}/calculate-cid", self.upload_base))
            .multipart(form)
            .timeout(Duration::from_secs(CONTENT_STORE_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| FuseVaultError::ContentStoreUnavailable(e.to_string()))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| FuseVaultError::ContentStoreMalformed(e.to_string()))?;

        let cid_str = body
            .get("computed_cid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FuseVaultError::ContentStoreMalformed("missing computed_cid".into()))?;

        Cid::new(cid_str.to_string()).map_err(|e| FuseVaultError::ContentStoreMalformed(e.to_string()))
    }

    async fn retrieve(&self, cid: &Cid) -> Result<RetrievedPayload, FuseVaultError> {
        let primary = format!("{}/file/{}/contents", self.upload_base, cid.as_str());
        let mut attempts = vec![primary];
        if self.fallback_gateways.is_empty() {
            attempts.push(Self::gateway_url("https://{cid}.ipfs.w3s.link", cid));
            attempts.push(Self::gateway_url("https://{cid}.ipfs.dweb.link", cid));
        } else {
            for template in &self.fallback_gateways {
                attempts.push(Self::gateway_url(template, cid));
            }
        }

        let mut last_err = None;
        for url in attempts {
            match self.fetch_raw(&url).await {
                Ok(bytes) => return Ok(Self::decode_or_sentinel(&bytes)),
                Err(e) => {
                    tracing::warn!(gateway = %url, error = %e, "content retrieval attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(FuseVaultError::ContentUnavailable(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no gateways configured".into()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_plain_string_cid() {
        let v = json!("bafy123");
        assert_eq!(ContentStoreHttp::unwrap_cid_value(&v), Some("bafy123".to_string()));
    }

    #[test]
    fn unwraps_nested_link_object_cid() {
        let v = json!({"/": "bafy123"});
        assert_eq!(ContentStoreHttp::unwrap_cid_value(&v), Some("bafy123".to_string()));
    }

    #[test]
    fn decode_or_sentinel_passes_through_valid_json() {
        let bytes = br#"{"title":"A"}"#;
        let v = ContentStoreHttp::decode_or_sentinel(bytes);
        assert_eq!(v, json!({"title": "A"}));
    }

    #[test]
    fn decode_or_sentinel_wraps_garbage() {
        let bytes = b"not json at all";
        let v = ContentStoreHttp::decode_or_sentinel(bytes);
        assert_eq!(
            v["critical_metadata"]["recovered_content"],
            json!("not json at all")
        );
        assert!(v["retrieval_error"].is_string());
    }
}
