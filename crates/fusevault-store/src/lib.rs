pub mod api_keys;
pub mod assets;
pub mod db;
pub mod delegation;
pub mod pending;
pub mod rate_limit;
pub mod txlog;

pub use api_keys::ApiKeyStore;
pub use assets::{AssetStore, DeleteOutcome};
pub use db::StoreDb;
pub use delegation::DelegationCache;
pub use pending::{PendingTxCoordinator, PendingTxStats};
pub use rate_limit::RateLimiter;
pub use txlog::TransactionLog;
