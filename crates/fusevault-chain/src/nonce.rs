use ethers::providers::Middleware;
use tokio::sync::Mutex;

use fusevault_core::error::FuseVaultError;

/// Serializes the server wallet's nonce across concurrent server-signed
/// writes (§5: "nonce management MUST serialize server-signed transactions").
pub struct NonceManager {
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self { next: Mutex::new(None) }
    }

    /// Returns the next nonce to use, refreshing from the chain on first use
    /// or after a prior broadcast failure invalidated the cached value.
    pub async fn reserve<M: Middleware>(
        &self,
        provider: &M,
        address: ethers::types::Address,
    ) -> Result<u64, FuseVaultError>
    where
        M::Error: std::fmt::Display,
    {
        let mut guard = self.next.lock().await;
        let nonce = match *guard {
            Some(n) => n,
            None => provider
                .get_transaction_count(address, None)
                .await
                .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
                .as_u64(),
        };
        *guard = Some(nonce + 1);
        Ok(nonce)
    }

    /// Invalidates the cached nonce so the next `reserve` re-reads the chain
    /// (called after a broadcast failure that may have been nonce-related).
    pub async fn invalidate(&self) {
        *self.next.lock().await = None;
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}
