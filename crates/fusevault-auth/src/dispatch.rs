//! The auth dispatcher (§4.8). Session-cookie validation itself is an
//! external collaborator (out of scope, per the HTTP routing layer); this
//! takes an already-validated session wallet as input and only decides which
//! of the two auth contexts wins and flows down into the orchestrators.

use fusevault_core::error::FuseVaultError;
use fusevault_core::model::Permission;
use fusevault_core::types::{Timestamp, WalletAddress};

use crate::api_key_auth::{ApiKeyAuthContext, ApiKeyAuthenticator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Wallet,
    ApiKey,
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub wallet_address: WalletAddress,
    pub auth_method: AuthMethod,
    pub permissions: Vec<Permission>,
}

impl AuthContext {
    pub fn has_permission(&self, required: Permission) -> bool {
        self.permissions.contains(&required)
    }

    /// Server-signed chain calls require wallet auth to have come from the
    /// server's own delegated authority, not a user's session — orchestrators
    /// use this to decide server-signed vs. pending-signature execution.
    pub fn is_api_key(&self) -> bool {
        self.auth_method == AuthMethod::ApiKey
    }
}

/// Wallet auth strictly precedes API-key auth (§4.8): a validated session
/// always wins even if an API key is also present on the request.
pub fn dispatch(
    session_wallet: Option<&WalletAddress>,
    raw_api_key: Option<&str>,
    api_key_auth_enabled: bool,
    authenticator: &ApiKeyAuthenticator<'_>,
    now: Timestamp,
) -> Result<Option<AuthContext>, FuseVaultError> {
    if let Some(wallet) = session_wallet {
        return Ok(Some(AuthContext {
            wallet_address: wallet.clone(),
            auth_method: AuthMethod::Wallet,
            permissions: vec![Permission::Read, Permission::Write, Permission::Delete],
        }));
    }

    if !api_key_auth_enabled {
        return Ok(None);
    }

    let Some(raw_key) = raw_api_key.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let ApiKeyAuthContext { wallet_address, permissions } = authenticator.authenticate(raw_key, now)?;
    Ok(Some(AuthContext { wallet_address, auth_method: AuthMethod::ApiKey, permissions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusevault_core::model::ApiKeyRecord;
    use fusevault_crypto::api_key::{generate_api_key, key_hash};
    use fusevault_store::{ApiKeyStore, RateLimiter, StoreDb};
    use serde_json::Value;
    use std::sync::Arc;

    #[test]
    fn wallet_session_wins_over_api_key() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let keys = ApiKeyStore::new(db.clone());
        let limiter = RateLimiter::new(db);
        let authenticator = ApiKeyAuthenticator::new(&keys, &limiter, b"secret");
        let session_wallet = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();

        let ctx = dispatch(Some(&session_wallet), Some("garbage"), true, &authenticator, 1000)
            .unwrap()
            .unwrap();
        assert_eq!(ctx.auth_method, AuthMethod::Wallet);
    }

    #[test]
    fn api_key_used_when_no_session() {
        let secret = b"secret";
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let keys = ApiKeyStore::new(db.clone());
        let limiter = RateLimiter::new(db);
        let wallet = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        let full_key = generate_api_key(wallet.tag8(), secret);
        keys.insert(ApiKeyRecord {
            key_hash: key_hash(&full_key),
            wallet_address: wallet.clone(),
            name: "ci".into(),
            permissions: vec![fusevault_core::model::Permission::Read],
            expires_at: None,
            created_at: 0,
            last_used_at: None,
            is_active: true,
            metadata: Value::Null,
        })
        .unwrap();
        let authenticator = ApiKeyAuthenticator::new(&keys, &limiter, secret);

        let ctx = dispatch(None, Some(&full_key), true, &authenticator, 1000).unwrap().unwrap();
        assert_eq!(ctx.auth_method, AuthMethod::ApiKey);
        assert_eq!(ctx.wallet_address, wallet);
    }

    #[test]
    fn no_credentials_yields_none() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let keys = ApiKeyStore::new(db.clone());
        let limiter = RateLimiter::new(db);
        let authenticator = ApiKeyAuthenticator::new(&keys, &limiter, b"secret");
        assert!(dispatch(None, None, true, &authenticator, 1000).unwrap().is_none());
    }
}
