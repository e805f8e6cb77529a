//! fusevault-node — the FuseVault registry node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the persistent store
//!   2. Connect the chain client (server signing key + JSON-RPC endpoint)
//!   3. Wire the content store, orchestrator context and RPC state
//!   4. Start the JSON-RPC 2.0 server
//!   5. Run background sweeps: pending-tx expiry, rate-limit buckets,
//!      delegate-event sync

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ethers::types::Address;
use tracing::{info, warn};

use fusevault_chain::{ChainClient, EthersChainClient};
use fusevault_content::ContentStoreHttp;
use fusevault_core::constants::EXPIRY_SWEEP_INTERVAL_SECS;
use fusevault_orchestrator::OrchestratorCtx;
use fusevault_rpc::{RpcServer, RpcServerState};
use fusevault_store::{ApiKeyStore, AssetStore, DelegationCache, PendingTxCoordinator, RateLimiter, StoreDb, TransactionLog};

#[derive(Parser, Debug)]
#[command(
    name = "fusevault-node",
    version,
    about = "FuseVault registry node — tamper-evident metadata anchored to IPFS and a chain"
)]
struct Args {
    /// Directory for the persistent store database.
    #[arg(long, default_value = "~/.fusevault/data")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8787")]
    rpc_addr: SocketAddr,

    /// Content-store (IPFS) upload endpoint.
    #[arg(long, default_value = "http://127.0.0.1:5001")]
    content_upload_url: String,

    /// Fallback content-store gateway URLs, comma-separated. Empty uses the
    /// built-in public-gateway defaults.
    #[arg(long, value_delimiter = ',')]
    content_fallback_gateways: Vec<String>,

    /// JSON-RPC endpoint of the chain the registry contract lives on.
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    chain_rpc_url: String,

    /// Deployed FuseVaultRegistry contract address.
    #[arg(long)]
    contract_address: Address,

    /// Path to a file holding the server's signing key as a hex private key,
    /// used for §4.2 execution mode 1 (server-signed API-key calls).
    #[arg(long, default_value = "~/.fusevault/server_key.hex")]
    server_key_path: PathBuf,

    /// Path to a file holding the HMAC secret used to derive and verify API
    /// keys (§4.7). Generated on first run if missing.
    #[arg(long, default_value = "~/.fusevault/api_key_secret.hex")]
    api_key_secret_path: PathBuf,

    /// Disable API-key authentication entirely, accepting only wallet-signed
    /// sessions. Useful for deployments that only want wallet auth.
    #[arg(long)]
    disable_api_key_auth: bool,

    /// Default per-wallet API-key rate limit, requests per minute. 0 uses
    /// the built-in default.
    #[arg(long, default_value_t = 0)]
    api_key_rate_limit_per_minute: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fusevault=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("FuseVault node starting");

    // ── Persistent store ──────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let db = Arc::new(StoreDb::open(&data_dir).context("opening store database")?);

    let assets = Arc::new(AssetStore::new(db.clone()));
    let txlog = Arc::new(TransactionLog::new(db.clone()));
    let pending = Arc::new(PendingTxCoordinator::new(db.clone()));
    let delegation = Arc::new(DelegationCache::new(db.clone()));
    let api_keys = Arc::new(ApiKeyStore::new(db.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(db.clone()));

    // ── Chain client ──────────────────────────────────────────────────────────
    let server_key = load_or_generate_server_key(&expand_tilde(&args.server_key_path))
        .context("loading server signing key")?;
    let chain = Arc::new(
        EthersChainClient::connect(&args.chain_rpc_url, args.contract_address, server_key)
            .await
            .context("connecting chain client")?,
    );
    info!(server_wallet = %chain.server_wallet_address(), "chain client connected");

    // ── Content store ─────────────────────────────────────────────────────────
    let content = Arc::new(if args.content_fallback_gateways.is_empty() {
        ContentStoreHttp::with_default_fallbacks(args.content_upload_url.clone())
    } else {
        ContentStoreHttp::new(args.content_upload_url.clone(), args.content_fallback_gateways.clone())
    });

    // ── Orchestrator context ──────────────────────────────────────────────────
    let orchestrator = Arc::new(OrchestratorCtx::new(content, chain.clone(), assets, txlog, pending.clone(), delegation.clone()));

    // ── API-key secret ────────────────────────────────────────────────────────
    let api_key_secret = load_or_generate_api_key_secret(&expand_tilde(&args.api_key_secret_path))
        .context("loading API-key secret")?;

    // ── RPC server ─────────────────────────────────────────────────────────────
    let rpc_state = Arc::new(RpcServerState {
        orchestrator,
        api_keys,
        rate_limiter: rate_limiter.clone(),
        api_key_secret,
        api_key_auth_enabled: !args.disable_api_key_auth,
        api_key_rate_limit_per_minute: args.api_key_rate_limit_per_minute,
    });
    let _rpc_handle = RpcServer::new(rpc_state)
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    // ── Background sweeps ─────────────────────────────────────────────────────
    spawn_expiry_sweep(pending.clone(), rate_limiter.clone());
    spawn_delegate_sync(chain, delegation);

    info!("node ready");
    std::future::pending::<()>().await;
    Ok(())
}

/// Periodically purges expired pending transactions and stale rate-limit
/// buckets (§4.5, §4.7). Both are cheap, idempotent sweeps over the same DB.
fn spawn_expiry_sweep(pending: Arc<PendingTxCoordinator>, rate_limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));
        loop {
            tick.tick().await;
            let now = now_ts();
            match pending.purge_expired(now) {
                Ok(n) if n > 0 => info!(purged = n, "swept expired pending transactions"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "pending-tx sweep failed"),
            }
            match rate_limiter.purge_stale(now) {
                Ok(n) if n > 0 => info!(purged = n, "swept stale rate-limit buckets"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "rate-limit sweep failed"),
            }
        }
    });
}

/// Mirrors on-chain `DelegateStatusChanged` events into the delegation cache
/// (§4.6) so `listDelegates` does not need a live chain call. Walks forward
/// from the last-seen block in fixed-size windows.
fn spawn_delegate_sync(chain: Arc<EthersChainClient>, delegation: Arc<DelegationCache>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));
        let mut next_block: u64 = 0;
        loop {
            tick.tick().await;
            let latest = match chain.latest_block_number().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "failed to fetch latest block for delegate sync");
                    continue;
                }
            };
            if latest < next_block {
                continue;
            }
            match chain.scan_delegate_events(next_block, latest).await {
                Ok(events) => {
                    for event in events {
                        let now = now_ts();
                        if let Err(e) = delegation.sync_from_event(
                            &event.owner,
                            &event.delegate,
                            event.status,
                            Some(event.tx_hash),
                            Some(event.block_number),
                            now,
                        ) {
                            warn!(error = %e, "failed to sync delegate event");
                        }
                    }
                    next_block = latest + 1;
                }
                Err(e) => warn!(error = %e, "delegate event scan failed"),
            }
        }
    });
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Reads a hex-encoded private key from `path`, generating and persisting a
/// fresh one if the file does not exist yet.
///
/// # Warning
/// A generated key is ephemeral per-node identity, not a funded account —
/// operators deploying against a real chain must supply their own funded key.
fn load_or_generate_server_key(path: &Path) -> anyhow::Result<ethers::signers::LocalWallet> {
    use ethers::signers::LocalWallet;

    if let Ok(existing) = std::fs::read_to_string(path) {
        let wallet: LocalWallet = existing.trim().parse().context("parsing server signing key")?;
        return Ok(wallet);
    }

    warn!(path = %path.display(), "no server signing key found — generating an ephemeral one");
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, hex::encode(wallet.signer().to_bytes()))
        .with_context(|| format!("writing generated server key to {}", path.display()))?;
    Ok(wallet)
}

/// Reads the HMAC secret used for API-key derivation, generating and
/// persisting a fresh 32-byte secret if the file does not exist yet.
fn load_or_generate_api_key_secret(path: &Path) -> anyhow::Result<Vec<u8>> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        return hex::decode(existing.trim()).context("parsing API-key secret as hex");
    }

    warn!(path = %path.display(), "no API-key secret found — generating a fresh one");
    let mut secret = vec![0u8; 32];
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut secret);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, hex::encode(&secret)).with_context(|| format!("writing generated API-key secret to {}", path.display()))?;
    Ok(secret)
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
