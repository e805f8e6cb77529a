//! fusevault-cli
//!
//! Ops/testing client for a running FuseVault node. Talks JSON-RPC 2.0 over
//! plain HTTP; every subcommand maps to one `fusevault_*` method.
//!
//! Usage:
//!   fusevault-cli upload       --asset-id <id> --owner <wallet> --critical <json> [--non-critical <json>]
//!   fusevault-cli retrieve     --asset-id <id> [--version <n>] [--auto-recover]
//!   fusevault-cli delete       --asset-id <id>
//!   fusevault-cli transactions --asset-id <id>
//!   fusevault-cli pending
//!   fusevault-cli set-delegate --owner <wallet> --delegate <wallet> --status <bool>
//!   fusevault-cli delegates    --owner <wallet>
//!   fusevault-cli create-key   --wallet <wallet> --name <name> --permissions read,write
//!   fusevault-cli list-keys    --wallet <wallet>
//!   fusevault-cli revoke-key   --key-hash <hex>
//!   fusevault-cli complete     --pending-tx-id <id> --tx-hash <hex>

use anyhow::Context;
use clap::{Parser, Subcommand};

use fusevault_rpc::{RpcCreateApiKeyRequest, RpcUploadRequest};

mod rpc_client;
use rpc_client::FuseVaultRpcClient;

#[derive(Parser, Debug)]
#[command(name = "fusevault-cli", version, about = "FuseVault node client — upload, retrieve, delete and manage assets")]
struct Args {
    /// Node RPC endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8787")]
    rpc: String,

    /// Wallet address to authenticate as (wallet-auth path).
    #[arg(long, global = true)]
    session_wallet: Option<String>,

    /// Raw API key to authenticate with (API-key path).
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update an asset.
    Upload {
        #[arg(long)]
        asset_id: String,
        #[arg(long)]
        owner: String,
        /// Critical metadata, as a JSON literal.
        #[arg(long)]
        critical: String,
        /// Non-critical metadata, as a JSON literal.
        #[arg(long, default_value = "{}")]
        non_critical: String,
    },

    /// Fetch, verify and (optionally) auto-recover a version.
    Retrieve {
        #[arg(long)]
        asset_id: String,
        #[arg(long)]
        version: Option<u32>,
        #[arg(long, default_value_t = false)]
        auto_recover: bool,
    },

    /// Soft-delete an asset.
    Delete {
        #[arg(long)]
        asset_id: String,
    },

    /// List the transaction log for an asset.
    Transactions {
        #[arg(long)]
        asset_id: String,
    },

    /// List pending transactions awaiting a wallet signature.
    Pending,

    /// Resume a wallet-signed transaction once it has a chain tx hash.
    Complete {
        #[arg(long)]
        pending_tx_id: String,
        #[arg(long)]
        tx_hash: String,
    },

    /// Grant or revoke a delegate.
    SetDelegate {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        delegate: String,
        /// true to grant, false to revoke.
        #[arg(long, action = clap::ArgAction::Set)]
        status: bool,
    },

    /// List delegates registered for an owner.
    Delegates {
        #[arg(long)]
        owner: String,
    },

    /// Issue a new API key. Prints the full key exactly once.
    CreateKey {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        name: String,
        /// Comma-separated: read,write,delete.
        #[arg(long, value_delimiter = ',', default_value = "read")]
        permissions: Vec<String>,
        #[arg(long)]
        expires_at: Option<i64>,
    },

    /// List API keys registered to a wallet.
    ListKeys {
        #[arg(long)]
        wallet: String,
    },

    /// Deactivate an API key.
    RevokeKey {
        #[arg(long)]
        key_hash: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn,fusevault_cli=info").init();

    let args = Args::parse();
    let client = FuseVaultRpcClient::new(&args.rpc, args.session_wallet, args.api_key);

    match args.command {
        Command::Upload { asset_id, owner, critical, non_critical } => {
            let critical_metadata = serde_json::from_str(&critical).context("parsing --critical as JSON")?;
            let non_critical_metadata = serde_json::from_str(&non_critical).context("parsing --non-critical as JSON")?;
            let outcome = client
                .upload_asset(RpcUploadRequest { asset_id, owner, critical_metadata, non_critical_metadata })
                .await?;
            print_json(&outcome)
        }

        Command::Retrieve { asset_id, version, auto_recover } => {
            let result = client.retrieve_asset(&asset_id, version, auto_recover).await?;
            print_json(&result)
        }

        Command::Delete { asset_id } => {
            let outcome = client.delete_asset(&asset_id).await?;
            print_json(&outcome)
        }

        Command::Transactions { asset_id } => {
            let records = client.list_transactions(&asset_id).await?;
            print_json(&records)
        }

        Command::Pending => {
            let records = client.list_pending_transactions().await?;
            print_json(&records)
        }

        Command::Complete { pending_tx_id, tx_hash } => {
            let result = client.complete_pending_transaction(&pending_tx_id, &tx_hash).await?;
            print_json(&result)
        }

        Command::SetDelegate { owner, delegate, status } => {
            let outcome = client.set_delegate(&owner, &delegate, status).await?;
            print_json(&outcome)
        }

        Command::Delegates { owner } => {
            let records = client.list_delegates(&owner).await?;
            print_json(&records)
        }

        Command::CreateKey { wallet, name, permissions, expires_at } => {
            let created = client
                .create_api_key(RpcCreateApiKeyRequest { wallet_address: wallet, name, permissions, expires_at })
                .await?;
            println!("API key (shown once, store it now): {}", created.api_key);
            print_json(&created)
        }

        Command::ListKeys { wallet } => {
            let records = client.list_api_keys(&wallet).await?;
            print_json(&records)
        }

        Command::RevokeKey { key_hash } => {
            let revoked = client.revoke_api_key(&key_hash).await?;
            println!("revoked: {}", revoked);
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
