//! Protocol-wide constants. Grouped the way the surrounding system is
//! grouped: storage keys, timeouts, limits.

// ── Pending-transaction coordinator ─────────────────────────────────────────

/// Default TTL for a pending (unsigned) transaction, in seconds.
pub const PENDING_TX_DEFAULT_TTL_SECS: u64 = 300;

/// Interval between background sweeps that purge expired pending transactions
/// and rate-limit counters.
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;

// ── Batch limits ─────────────────────────────────────────────────────────────

/// Maximum number of assets in one upload or delete batch.
pub const MAX_BATCH_SIZE: usize = 50;

// ── Chain client ─────────────────────────────────────────────────────────────

/// Block window size used by `recover_from_events` and the delegation sweep.
pub const EVENT_SCAN_BATCH_BLOCKS: u64 = 1_000;

/// Deadline for a single chain read call.
pub const CHAIN_READ_TIMEOUT_SECS: u64 = 10;

/// Default deadline for waiting on a transaction receipt.
pub const CHAIN_RECEIPT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of `EVENT_SCAN_BATCH_BLOCKS`-sized windows
/// `recover_from_events` will walk backward before giving up.
pub const EVENT_SCAN_MAX_WINDOWS: u64 = 100;

// ── Content store ────────────────────────────────────────────────────────────

/// Deadline for a single content-store HTTP call (store, compute, retrieve).
pub const CONTENT_STORE_TIMEOUT_SECS: u64 = 90;

/// Number of leading bytes of an undecodable retrieval kept in the
/// `recovered_content` sentinel.
pub const RECOVERED_CONTENT_SENTINEL_BYTES: usize = 500;

// ── API-key subsystem ────────────────────────────────────────────────────────

/// Number of random bytes in an API-key nonce, pre-base64.
pub const API_KEY_NONCE_BYTES: usize = 16;

/// Number of leading bytes of the HMAC-SHA256 tag embedded in the key
/// (240 bits), pre-base64.
pub const API_KEY_SIGNATURE_BYTES: usize = 30;

/// Number of trailing lowercase hex characters of the owner address embedded
/// in the key as `wallet_tag8`.
pub const API_KEY_WALLET_TAG_LEN: usize = 8;

/// Default per-wallet API-key count ceiling.
pub const API_KEY_MAX_PER_WALLET: usize = 50;

/// Default per-wallet requests-per-minute ceiling.
pub const API_KEY_DEFAULT_RATE_LIMIT_PER_MINUTE: u64 = 60;

/// Rate-limit counter bucket lifetime, in seconds (outlives the 60s minute
/// bucket so a slow reader never observes a counter disappear mid-window).
pub const RATE_LIMIT_BUCKET_TTL_SECS: u64 = 120;

// ── Asset store ──────────────────────────────────────────────────────────────

/// Bound on `create_new_version`'s compare-and-swap retry loop.
pub const VERSION_CAS_MAX_ATTEMPTS: u32 = 8;
