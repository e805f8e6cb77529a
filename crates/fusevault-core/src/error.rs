use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace. Every orchestrator
/// operation resolves to `Result<Outcome<T>, FuseVaultError>` — see
/// `fusevault-orchestrator` for `Outcome`.
///
/// `IntegrityFailure` is deliberately absent: tamper detection is never
/// raised as an error, it is returned as data inside a successful retrieval
/// (`VerificationVerdict { verified: false, .. }`).
#[derive(Debug, Error)]
pub enum FuseVaultError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("malformed input: {0}")]
    Validation(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("batch size {got} exceeds maximum of {max}")]
    BatchTooLarge { got: usize, max: usize },

    // ── Authorization ────────────────────────────────────────────────────────
    #[error("authentication required")]
    Unauthenticated,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("on-chain delegation not found for owner {owner}, delegate {delegate}")]
    DelegationNotFound { owner: String, delegate: String },

    #[error("API key lacks required permission: {0}")]
    MissingPermission(String),

    // ── NotFound ─────────────────────────────────────────────────────────────
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("version {version} of asset {asset_id} not found")]
    VersionNotFound { asset_id: String, version: u32 },

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("pending transaction not found or expired: {0}")]
    PendingTxNotFound(String),

    // ── Conflict ─────────────────────────────────────────────────────────────
    #[error("asset already exists: {0}")]
    AssetAlreadyExists(String),

    #[error("pending transfer already exists for asset {0}")]
    PendingTransferExists(String),

    #[error("version CAS failed after {attempts} attempts on asset {asset_id}")]
    VersionConflict { asset_id: String, attempts: u32 },

    // ── RateLimited ──────────────────────────────────────────────────────────
    #[error("rate limit exceeded for wallet {0}")]
    RateLimited(String),

    // ── DependencyUnavailable ────────────────────────────────────────────────
    #[error("content store unavailable: {0}")]
    ContentStoreUnavailable(String),

    #[error("content store returned a malformed response: {0}")]
    ContentStoreMalformed(String),

    #[error("content unavailable from every configured gateway: {0}")]
    ContentUnavailable(String),

    #[error("chain RPC unavailable: {0}")]
    ChainUnavailable(String),

    #[error("chain call timed out: {0}")]
    ChainTimeout(String),

    #[error("chain transaction reverted: {0}")]
    ChainRevert(String),

    #[error("rate-limit backend unavailable")]
    RateLimitBackendUnavailable,

    // ── Internal ─────────────────────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl FuseVaultError {
    /// Coarse kind used by the RPC boundary to map onto a status code.
    pub fn kind(&self) -> ErrorKind {
        use FuseVaultError::*;
        match self {
            Validation(_) | UnknownAction(_) | BatchTooLarge { .. } => ErrorKind::Validation,
            Unauthenticated | Unauthorized(_) | DelegationNotFound { .. } | MissingPermission(_) => {
                ErrorKind::Authorization
            }
            AssetNotFound(_) | VersionNotFound { .. } | TransactionNotFound(_)
            | PendingTxNotFound(_) => ErrorKind::NotFound,
            AssetAlreadyExists(_) | PendingTransferExists(_) | VersionConflict { .. } => {
                ErrorKind::Conflict
            }
            RateLimited(_) | RateLimitBackendUnavailable => ErrorKind::RateLimited,
            ContentStoreUnavailable(_)
            | ContentStoreMalformed(_)
            | ContentUnavailable(_)
            | ChainUnavailable(_)
            | ChainTimeout(_)
            | ChainRevert(_) => ErrorKind::DependencyUnavailable,
            Serialization(_) | Storage(_) | Other(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    RateLimited,
    DependencyUnavailable,
    Internal,
}
