//! Explicit context object threaded through every orchestrator call, built
//! once at startup (see `fusevault-node`) — the replacement for the
//! module-level DB/chain singletons flagged in §9.

use std::sync::Arc;

use fusevault_chain::ChainClient;
use fusevault_content::ContentStore;
use fusevault_store::{AssetStore, DelegationCache, PendingTxCoordinator, TransactionLog};

#[derive(Clone)]
pub struct OrchestratorCtx {
    pub content: Arc<dyn ContentStore>,
    pub chain: Arc<dyn ChainClient>,
    pub assets: Arc<AssetStore>,
    pub txlog: Arc<TransactionLog>,
    pub pending: Arc<PendingTxCoordinator>,
    /// UX-listing mirror of on-chain delegation state (§4.6) — never
    /// consulted by an authorization check, only synced after a
    /// `setDelegate` receipt confirms and by the node's background sweep.
    pub delegation: Arc<DelegationCache>,
}

impl OrchestratorCtx {
    pub fn new(
        content: Arc<dyn ContentStore>,
        chain: Arc<dyn ChainClient>,
        assets: Arc<AssetStore>,
        txlog: Arc<TransactionLog>,
        pending: Arc<PendingTxCoordinator>,
        delegation: Arc<DelegationCache>,
    ) -> Self {
        Self { content, chain, assets, txlog, pending, delegation }
    }
}
