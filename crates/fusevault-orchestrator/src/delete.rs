//! The delete orchestrator (§4.10).

use serde_json::json;

use fusevault_auth::AuthContext;
use fusevault_chain::ContractCall;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::Action;
use fusevault_core::types::{AssetId, Timestamp, TxHash, WalletAddress};
use fusevault_store::DeleteOutcome;

use crate::ctx::OrchestratorCtx;
use crate::outcome::{Outcome, PendingTxHandle};

#[derive(Debug, Clone)]
pub struct DeleteInput {
    pub asset_id: AssetId,
    pub initiator: WalletAddress,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// This call's chain transaction (or server-signed call) deleted the asset.
    Deleted,
    /// The chain already reported the asset deleted; only the DB was synced.
    Synced,
    /// Already soft-deleted in the DB, nothing to do (§4.10 step 1 warning).
    AlreadyDeleted,
}

#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub asset_id: AssetId,
    pub status: DeleteStatus,
}

/// Looks up the owner and checks the three-way authorization rule (§4.10
/// step 2): owner-initiated, live on-chain delegate, or (API-key path) a
/// dual delegation of both the initiator and the server wallet.
async fn authorize(
    ctx: &OrchestratorCtx,
    owner: &WalletAddress,
    initiator: &WalletAddress,
    auth: &AuthContext,
) -> Result<(), FuseVaultError> {
    if initiator == owner {
        return Ok(());
    }
    if auth.is_api_key() {
        let initiator_delegated = ctx.chain.is_delegate(owner, initiator).await?;
        let server_delegated = ctx.chain.is_delegate(owner, &ctx.chain.server_wallet_address()).await?;
        if initiator_delegated && server_delegated {
            return Ok(());
        }
        return Err(FuseVaultError::Unauthorized(format!(
            "API-key delete requires {} to have delegated both {} and the server wallet",
            owner, initiator
        )));
    }
    if ctx.chain.is_delegate(owner, initiator).await? {
        return Ok(());
    }
    Err(FuseVaultError::Unauthorized(format!(
        "{} is neither the owner nor a chain-verified delegate of {}",
        initiator, owner
    )))
}

fn log_delete(
    ctx: &OrchestratorCtx,
    asset_id: &AssetId,
    owner: &WalletAddress,
    initiator: &WalletAddress,
    now: Timestamp,
    tx_hash: Option<&TxHash>,
) -> Result<(), FuseVaultError> {
    ctx.txlog.append(
        asset_id,
        Action::Delete,
        owner,
        initiator,
        now,
        json!({
            "smartContractTxId": tx_hash.map(|t| t.as_str()),
            "owner_address": owner.as_str(),
        }),
    )
}

/// Runs the single-asset delete state machine.
pub async fn delete(
    ctx: &OrchestratorCtx,
    input: DeleteInput,
    auth: &AuthContext,
    now: Timestamp,
) -> Result<Outcome<DeleteResult>, FuseVaultError> {
    let current = ctx
        .assets
        .find_any_including_deleted(&input.asset_id)?
        .ok_or_else(|| FuseVaultError::AssetNotFound(input.asset_id.to_string()))?;

    if current.is_deleted {
        return Ok(Outcome::Done(DeleteResult { asset_id: input.asset_id, status: DeleteStatus::AlreadyDeleted }));
    }

    authorize(ctx, &current.owner_address, &input.initiator, auth).await?;

    let chain_info = ctx.chain.get_ipfs_info(&current.owner_address, &input.asset_id).await?;
    if chain_info.is_deleted {
        ctx.assets.soft_delete(&input.asset_id, &input.initiator, now)?;
        log_delete(ctx, &input.asset_id, &current.owner_address, &input.initiator, now, None)?;
        return Ok(Outcome::Done(DeleteResult { asset_id: input.asset_id, status: DeleteStatus::Synced }));
    }

    // Owner-less `deleteAsset` is only correct when the owner's own wallet
    // signs the transaction; API-key execution always signs with the server
    // key regardless of who initiated the call, so it must always name the
    // owner explicitly.
    let is_self = !auth.is_api_key() && input.initiator == current.owner_address;
    let call = if is_self {
        ContractCall::DeleteAsset { asset_id: input.asset_id.clone() }
    } else {
        ContractCall::DeleteAssetFor { owner: current.owner_address.clone(), asset_id: input.asset_id.clone() }
    };

    if auth.is_api_key() {
        let receipt = ctx.chain.execute_server_signed(call).await?;
        let outcome = ctx.assets.soft_delete(&input.asset_id, &input.initiator, now)?;
        log_delete(ctx, &input.asset_id, &current.owner_address, &input.initiator, now, Some(&receipt.tx_hash))?;
        let status = match outcome {
            DeleteOutcome::DeletedNow => DeleteStatus::Deleted,
            DeleteOutcome::AlreadyDeleted => DeleteStatus::AlreadyDeleted,
        };
        Ok(Outcome::Done(DeleteResult { asset_id: input.asset_id, status }))
    } else {
        let unsigned = ctx.chain.build_unsigned(call, &input.initiator).await?;
        let resume_data = json!({
            "asset_ids": [input.asset_id.as_str()],
            "owner": current.owner_address.as_str(),
            "initiator": input.initiator.as_str(),
            "reason": input.reason,
            "validated_assets": [{
                "asset_id": input.asset_id.as_str(),
                "owner": current.owner_address.as_str(),
            }],
        });
        let pending = ctx.pending.store(&input.initiator, "delete", unsigned.transaction_hex.clone(), resume_data, now, None)?;
        Ok(Outcome::PendingSignature(PendingTxHandle {
            pending_tx_id: pending.tx_id,
            transaction_hex: unsigned.transaction_hex,
            estimated_gas: unsigned.estimated_gas,
            gas_price_wei: unsigned.gas_price_wei,
            function_name: unsigned.function_name,
        }))
    }
}

/// Runs the batch delete state machine: per-asset lookup/authorization runs
/// up front (§4.10 step 1-3), a single chain call covers the whole batch.
pub async fn delete_batch(
    ctx: &OrchestratorCtx,
    asset_ids: Vec<AssetId>,
    initiator: WalletAddress,
    reason: Option<String>,
    auth: &AuthContext,
    now: Timestamp,
) -> Result<Outcome<Vec<DeleteResult>>, FuseVaultError> {
    if asset_ids.len() > fusevault_core::constants::MAX_BATCH_SIZE {
        return Err(FuseVaultError::BatchTooLarge {
            got: asset_ids.len(),
            max: fusevault_core::constants::MAX_BATCH_SIZE,
        });
    }

    let mut already_deleted = Vec::new();
    let mut to_sync = Vec::new();
    let mut to_chain_delete = Vec::new();

    for asset_id in &asset_ids {
        let current = ctx
            .assets
            .find_any_including_deleted(asset_id)?
            .ok_or_else(|| FuseVaultError::AssetNotFound(asset_id.to_string()))?;

        if current.is_deleted {
            already_deleted.push(asset_id.clone());
            continue;
        }

        authorize(ctx, &current.owner_address, &initiator, auth).await?;

        let chain_info = ctx.chain.get_ipfs_info(&current.owner_address, asset_id).await?;
        if chain_info.is_deleted {
            to_sync.push((asset_id.clone(), current.owner_address.clone()));
        } else {
            to_chain_delete.push((asset_id.clone(), current.owner_address.clone()));
        }
    }

    let mut results: Vec<DeleteResult> = already_deleted
        .into_iter()
        .map(|asset_id| DeleteResult { asset_id, status: DeleteStatus::AlreadyDeleted })
        .collect();

    for (asset_id, owner) in &to_sync {
        ctx.assets.soft_delete(asset_id, &initiator, now)?;
        log_delete(ctx, asset_id, owner, &initiator, now, None)?;
        results.push(DeleteResult { asset_id: asset_id.clone(), status: DeleteStatus::Synced });
    }

    if to_chain_delete.is_empty() {
        return Ok(Outcome::Done(results));
    }

    let is_self = !auth.is_api_key() && to_chain_delete.iter().all(|(_, owner)| *owner == initiator);
    let ids: Vec<AssetId> = to_chain_delete.iter().map(|(id, _)| id.clone()).collect();
    let call = if is_self {
        ContractCall::BatchDeleteAssets { asset_ids: ids.clone() }
    } else {
        // A delegate/server batch call names a single owner; each asset's
        // authorize() check above only confirms the initiator may act on
        // that asset's own owner, not that every asset shares one owner.
        let owner = to_chain_delete[0].1.clone();
        if to_chain_delete.iter().any(|(_, o)| *o != owner) {
            return Err(FuseVaultError::Validation(
                "batch delete on behalf of a delegate requires every asset to share the same owner".into(),
            ));
        }
        ContractCall::BatchDeleteAssetsFor { owner, asset_ids: ids.clone() }
    };

    if auth.is_api_key() {
        let receipt = ctx.chain.execute_server_signed(call).await?;
        for (asset_id, owner) in &to_chain_delete {
            let outcome = ctx.assets.soft_delete(asset_id, &initiator, now)?;
            log_delete(ctx, asset_id, owner, &initiator, now, Some(&receipt.tx_hash))?;
            let status = match outcome {
                DeleteOutcome::DeletedNow => DeleteStatus::Deleted,
                DeleteOutcome::AlreadyDeleted => DeleteStatus::AlreadyDeleted,
            };
            results.push(DeleteResult { asset_id: asset_id.clone(), status });
        }
        Ok(Outcome::Done(results))
    } else {
        let unsigned = ctx.chain.build_unsigned(call, &initiator).await?;
        let validated_assets: Vec<_> = to_chain_delete
            .iter()
            .map(|(id, owner)| json!({"asset_id": id.as_str(), "owner": owner.as_str()}))
            .collect();
        let resume_data = json!({
            "asset_ids": ids.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            "initiator": initiator.as_str(),
            "reason": reason,
            "validated_assets": validated_assets,
            "synced_results": results.iter().map(|r| json!({
                "asset_id": r.asset_id.as_str(),
                "status": format!("{:?}", r.status),
            })).collect::<Vec<_>>(),
        });
        let pending = ctx.pending.store(&initiator, "delete_batch", unsigned.transaction_hex.clone(), resume_data, now, None)?;
        Ok(Outcome::PendingSignature(PendingTxHandle {
            pending_tx_id: pending.tx_id,
            transaction_hex: unsigned.transaction_hex,
            estimated_gas: unsigned.estimated_gas,
            gas_price_wei: unsigned.gas_price_wei,
            function_name: unsigned.function_name,
        }))
    }
}

/// Resumes a delete (single or batch) paused at the signature step, given
/// the hash of the transaction the wallet broadcast itself. Iterates the
/// `validated_assets` snapshot captured when the pending transaction was
/// created, per §4.10's batch-completion note.
pub async fn complete_delete(
    ctx: &OrchestratorCtx,
    pending_tx_id: &str,
    blockchain_tx_hash: &TxHash,
    now: Timestamp,
) -> Result<Vec<DeleteResult>, FuseVaultError> {
    let pending = ctx.pending.get(pending_tx_id, now)?;
    ctx.chain.confirm_receipt(blockchain_tx_hash).await?;

    let data = &pending.resume_data;
    let initiator = WalletAddress::parse(data["initiator"].as_str().unwrap_or_default())
        .map_err(|e| FuseVaultError::Validation(e.to_string()))?;

    let mut results = Vec::new();
    if let Some(synced) = data.get("synced_results").and_then(|v| v.as_array()) {
        for entry in synced {
            let asset_id = AssetId::new(entry["asset_id"].as_str().unwrap_or_default());
            results.push(DeleteResult { asset_id, status: DeleteStatus::Synced });
        }
    }

    let validated = data["validated_assets"].as_array().cloned().unwrap_or_default();
    for entry in validated {
        let asset_id = AssetId::new(entry["asset_id"].as_str().unwrap_or_default());
        let owner = WalletAddress::parse(entry["owner"].as_str().unwrap_or_default())
            .map_err(|e| FuseVaultError::Validation(e.to_string()))?;
        let outcome = ctx.assets.soft_delete(&asset_id, &initiator, now)?;
        log_delete(ctx, &asset_id, &owner, &initiator, now, Some(blockchain_tx_hash))?;
        let status = match outcome {
            DeleteOutcome::DeletedNow => DeleteStatus::Deleted,
            DeleteOutcome::AlreadyDeleted => DeleteStatus::AlreadyDeleted,
        };
        results.push(DeleteResult { asset_id, status });
    }

    ctx.pending.remove(pending_tx_id)?;
    Ok(results)
}
