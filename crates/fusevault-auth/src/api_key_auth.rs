//! The API-key validation pipeline (§4.7), grounded step-for-step on the
//! original provider's `authenticate`/`_check_rate_limit`: header-or-query
//! extraction, format check, signature check, lookup, per-wallet rate limit,
//! then `last_used_at` bump.

use fusevault_core::constants::API_KEY_DEFAULT_RATE_LIMIT_PER_MINUTE;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::Permission;
use fusevault_core::types::Timestamp;
use fusevault_crypto::api_key::{key_hash, parse_api_key, verify_signature};
use fusevault_store::{ApiKeyStore, RateLimiter};

pub struct ApiKeyAuthContext {
    pub wallet_address: fusevault_core::types::WalletAddress,
    pub permissions: Vec<Permission>,
}

pub struct ApiKeyAuthenticator<'a> {
    keys: &'a ApiKeyStore,
    rate_limiter: &'a RateLimiter,
    secret: &'a [u8],
    rate_limit_per_minute: u64,
}

impl<'a> ApiKeyAuthenticator<'a> {
    pub fn new(keys: &'a ApiKeyStore, rate_limiter: &'a RateLimiter, secret: &'a [u8]) -> Self {
        Self {
            keys,
            rate_limiter,
            secret,
            rate_limit_per_minute: API_KEY_DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }

    pub fn with_rate_limit_per_minute(mut self, limit: u64) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    /// Runs the full pipeline over a raw key string (already extracted from
    /// the `X-API-Key` header or `?key=` query parameter and whitespace
    /// trimmed by the caller).
    pub fn authenticate(&self, raw_key: &str, now: Timestamp) -> Result<ApiKeyAuthContext, FuseVaultError> {
        let parsed = parse_api_key(raw_key)
            .map_err(|e| FuseVaultError::Unauthorized(format!("invalid API key format: {e}")))?;

        if !verify_signature(&parsed, self.secret) {
            return Err(FuseVaultError::Unauthorized("invalid API key signature".into()));
        }

        let hash = key_hash(raw_key);
        let record = self
            .keys
            .lookup_by_hash(&hash, now)?
            .ok_or_else(|| FuseVaultError::Unauthorized("invalid or expired API key".into()))?;

        let count = self.rate_limiter.increment(&record.wallet_address, now)?;
        if count > self.rate_limit_per_minute {
            return Err(FuseVaultError::RateLimited(record.wallet_address.to_string()));
        }

        self.keys.mark_used(&hash, now)?;

        Ok(ApiKeyAuthContext {
            wallet_address: record.wallet_address,
            permissions: record.permissions,
        })
    }

    /// Mirrors `check_permission`: a missing or empty permission list never
    /// grants access.
    pub fn has_permission(permissions: &[Permission], required: Permission) -> bool {
        permissions.contains(&required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusevault_core::model::ApiKeyRecord;
    use fusevault_core::types::WalletAddress;
    use fusevault_crypto::api_key::generate_api_key;
    use fusevault_store::StoreDb;
    use serde_json::Value;
    use std::sync::Arc;

    fn setup(secret: &[u8]) -> (ApiKeyStore, RateLimiter, String, WalletAddress) {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let keys = ApiKeyStore::new(db.clone());
        let limiter = RateLimiter::new(db);
        let wallet = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        let full_key = generate_api_key(wallet.tag8(), secret);
        let hash = key_hash(&full_key);
        keys.insert(ApiKeyRecord {
            key_hash: hash,
            wallet_address: wallet.clone(),
            name: "ci".into(),
            permissions: vec![Permission::Read, Permission::Write],
            expires_at: None,
            created_at: 0,
            last_used_at: None,
            is_active: true,
            metadata: Value::Null,
        })
        .unwrap();
        (keys, limiter, full_key, wallet)
    }

    #[test]
    fn valid_key_authenticates() {
        let secret = b"top-secret";
        let (keys, limiter, full_key, wallet) = setup(secret);
        let auth = ApiKeyAuthenticator::new(&keys, &limiter, secret);
        let ctx = auth.authenticate(&full_key, 1000).unwrap();
        assert_eq!(ctx.wallet_address, wallet);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = b"top-secret";
        let (keys, limiter, full_key, _wallet) = setup(secret);
        let auth = ApiKeyAuthenticator::new(&keys, &limiter, b"wrong-secret");
        let err = auth.authenticate(&full_key, 1000).unwrap_err();
        assert!(matches!(err, FuseVaultError::Unauthorized(_)));
    }

    #[test]
    fn rate_limit_is_enforced_per_wallet() {
        let secret = b"top-secret";
        let (keys, limiter, full_key, _wallet) = setup(secret);
        let auth = ApiKeyAuthenticator::new(&keys, &limiter, secret).with_rate_limit_per_minute(2);
        auth.authenticate(&full_key, 1000).unwrap();
        auth.authenticate(&full_key, 1001).unwrap();
        let err = auth.authenticate(&full_key, 1002).unwrap_err();
        assert!(matches!(err, FuseVaultError::RateLimited(_)));
    }
}
