//! The upload orchestrator (§4.9): create/update state machine.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use fusevault_auth::AuthContext;
use fusevault_chain::{ContractCall, UnsignedTransaction};
use fusevault_core::canonical::canonical_payload_bytes;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::{Action, AssetVersionRecord};
use fusevault_core::types::{AssetId, Cid, Timestamp, TxHash, WalletAddress};

use crate::ctx::OrchestratorCtx;
use crate::outcome::{Outcome, PendingTxHandle};

const MAX_CONCURRENT_UPLOADS: usize = 50;

#[derive(Debug, Clone)]
pub struct UploadInput {
    pub asset_id: AssetId,
    pub owner: WalletAddress,
    pub initiator: WalletAddress,
    pub critical: Value,
    pub non_critical: Value,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub record: AssetVersionRecord,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    FreshCreate,
    Recreate,
    NonCriticalOnly,
    CriticalChange,
}

struct Plan {
    branch: Branch,
    existing: Option<AssetVersionRecord>,
    new_cid: Cid,
    canonical_bytes: Vec<u8>,
}

/// Checks the three-way authorization rule shared with the delete
/// orchestrator: owner-initiated, a live on-chain delegate (wallet-auth), or
/// (API-key path) a dual delegation of both the initiator and the server
/// wallet — see invariant 12.
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
            "API-key update requires {} to have delegated both {} and the server wallet",
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

async fn plan_upload(ctx: &OrchestratorCtx, input: &UploadInput, auth: &AuthContext) -> Result<Plan, FuseVaultError> {
    let existing = ctx.assets.find_any_including_deleted(&input.asset_id)?;

    if let Some(record) = &existing {
        if record.is_deleted {
            if input.initiator != input.owner {
                return Err(FuseVaultError::Unauthorized(
                    "only the owner may recreate a deleted asset".into(),
                ));
            }
        } else {
            authorize(ctx, &input.owner, &input.initiator, auth).await?;
        }
    }

    let canonical_bytes = canonical_payload_bytes(&input.asset_id, &input.owner, &input.critical);
    let new_cid = ctx.content.compute_cid(&canonical_bytes).await?;

    let branch = match &existing {
        None => Branch::FreshCreate,
        Some(record) if record.is_deleted => Branch::Recreate,
        Some(record) if record.ipfs_hash == new_cid => Branch::NonCriticalOnly,
        Some(_) => Branch::CriticalChange,
    };

    Ok(Plan { branch, existing, new_cid, canonical_bytes })
}

/// Builds the contract call for anchoring a (possibly new) CID. The ABI
/// distinguishes a self-signed owner call (`storeCIDDigest`/`updateIPFS`)
/// from a delegate/server call acting on the owner's behalf
/// (`updateIPFSFor`); this is an engineering decision not spelled out in
/// the distilled contract surface (see DESIGN.md).
///
/// The owner-less variants are only correct when the owner's own wallet is
/// the one that ends up signing the transaction — true for the wallet-auth
/// self-initiated path, never for API-key execution, since
/// `execute_server_signed` always signs with the server's key regardless of
/// who initiated the call.
fn anchor_call(input: &UploadInput, is_first_version: bool, cid: &Cid, is_api_key: bool) -> ContractCall {
    let is_self = !is_api_key && input.initiator == input.owner;
    match (is_self, is_first_version) {
        (true, true) => ContractCall::StoreCidDigest { asset_id: input.asset_id.clone(), cid: cid.clone() },
        (true, false) => ContractCall::UpdateIpfs { asset_id: input.asset_id.clone(), cid: cid.clone() },
        (false, _) => ContractCall::UpdateIpfsFor {
            owner: input.owner.clone(),
            asset_id: input.asset_id.clone(),
            cid: cid.clone(),
        },
    }
}

fn action_for(branch: Branch) -> Action {
    match branch {
        Branch::FreshCreate => Action::Create,
        Branch::Recreate => Action::RecreateDeleted,
        Branch::NonCriticalOnly => Action::Update,
        Branch::CriticalChange => Action::VersionCreate,
    }
}

fn build_record(
    input: &UploadInput,
    plan: &Plan,
    ipfs_hash: Cid,
    chain_tx_id: TxHash,
    ipfs_version: u32,
    now: Timestamp,
    is_delegated_action: bool,
) -> AssetVersionRecord {
    let (version_number, previous_version_id, document_history, non_critical) = match &plan.existing {
        None => (1, None, vec![], input.non_critical.clone()),
        Some(_) if plan.branch == Branch::Recreate => (1, None, vec![], input.non_critical.clone()),
        Some(prev) => {
            let mut history = prev.document_history.clone();
            history.push(prev.version_number);
            (prev.version_number + 1, Some(prev.version_number), history, input.non_critical.clone())
        }
    };

    AssetVersionRecord {
        asset_id: input.asset_id.clone(),
        owner_address: input.owner.clone(),
        version_number,
        ipfs_version,
        critical_metadata: input.critical.clone(),
        non_critical_metadata: non_critical,
        ipfs_hash,
        chain_tx_id,
        is_current: true,
        is_deleted: false,
        deleted_by: None,
        deleted_at: None,
        previous_version_id,
        document_history,
        performed_by: input.initiator.clone(),
        is_delegated_action,
        last_updated: now,
        last_verified: None,
    }
}

/// Runs the single-asset upload state machine (§4.9 steps 1-5).
pub async fn upload(
    ctx: &OrchestratorCtx,
    input: UploadInput,
    auth: &AuthContext,
    now: Timestamp,
) -> Result<Outcome<UploadResult>, FuseVaultError> {
    let plan = plan_upload(ctx, &input, auth).await?;
    let is_delegated_action = input.initiator != input.owner;
    let is_first_version = matches!(plan.branch, Branch::FreshCreate | Branch::Recreate);

    if plan.branch == Branch::NonCriticalOnly {
        let prev = plan.existing.clone().expect("NonCriticalOnly implies an existing record");
        let record = build_record(&input, &plan, prev.ipfs_hash.clone(), prev.chain_tx_id.clone(), prev.ipfs_version, now, is_delegated_action);
        let inserted = ctx.assets.create_new_version(&input.asset_id, move |_| Ok(record.clone()))?;
        ctx.txlog.append(
            &input.asset_id,
            Action::Update,
            &input.owner,
            &input.initiator,
            now,
            json!({"versionNumber": inserted.version_number}),
        )?;
        return Ok(Outcome::Done(UploadResult { record: inserted, action: Action::Update }));
    }

    let call = anchor_call(&input, is_first_version, &plan.new_cid, auth.is_api_key());
    let action = action_for(plan.branch);

    if auth.is_api_key() {
        ctx.content.store(&plan.canonical_bytes).await?;
        let receipt = ctx.chain.execute_server_signed(call).await?;
        let next_ipfs_version = plan.existing.as_ref().map(|r| r.ipfs_version + 1).unwrap_or(1);
        let record = build_record(&input, &plan, plan.new_cid.clone(), receipt.tx_hash, next_ipfs_version, now, is_delegated_action);
        let inserted = ctx.assets.create_new_version(&input.asset_id, move |_| Ok(record.clone()))?;
        if plan.branch == Branch::Recreate {
            // Run after create_new_version, not before: the CAS in there
            // still expects the current-version pointer to match the
            // deleted record it is about to supersede, so the old rows
            // must still exist for that one transaction.
            ctx.assets.purge_deleted(&input.asset_id)?;
        }
        ctx.txlog.append(
            &input.asset_id,
            action,
            &input.owner,
            &input.initiator,
            now,
            json!({"versionNumber": inserted.version_number, "cid": inserted.ipfs_hash.as_str()}),
        )?;
        Ok(Outcome::Done(UploadResult { record: inserted, action }))
    } else {
        ctx.content.store(&plan.canonical_bytes).await?;
        let UnsignedTransaction { transaction_hex, estimated_gas, gas_price_wei, function_name } =
            ctx.chain.build_unsigned(call, &input.initiator).await?;

        let resume_data = json!({
            "asset_id": input.asset_id.as_str(),
            "owner": input.owner.as_str(),
            "initiator": input.initiator.as_str(),
            "critical": input.critical,
            "non_critical": input.non_critical,
            "cid": plan.new_cid.as_str(),
            "action": format!("{:?}", action),
            "is_delegated_action": is_delegated_action,
            "ipfs_version": plan.existing.as_ref().map(|r| r.ipfs_version + 1).unwrap_or(1),
        });
        let pending = ctx.pending.store(&input.initiator, "upload", transaction_hex.clone(), resume_data, now, None)?;

        Ok(Outcome::PendingSignature(PendingTxHandle {
            pending_tx_id: pending.tx_id,
            transaction_hex,
            estimated_gas,
            gas_price_wei,
            function_name,
        }))
    }
}

/// Resumes an upload paused at step 4, given the hash of the transaction the
/// wallet broadcast itself.
pub async fn complete_upload(
    ctx: &OrchestratorCtx,
    pending_tx_id: &str,
    blockchain_tx_hash: &TxHash,
    now: Timestamp,
) -> Result<UploadResult, FuseVaultError> {
    let pending = ctx.pending.get(pending_tx_id, now)?;
    ctx.chain.confirm_receipt(blockchain_tx_hash).await?;

    let data = &pending.resume_data;
    let asset_id = AssetId::new(data["asset_id"].as_str().unwrap_or_default());
    let owner = WalletAddress::parse(data["owner"].as_str().unwrap_or_default())
        .map_err(|e| FuseVaultError::Validation(e.to_string()))?;
    let initiator = WalletAddress::parse(data["initiator"].as_str().unwrap_or_default())
        .map_err(|e| FuseVaultError::Validation(e.to_string()))?;
    let critical = data["critical"].clone();
    let non_critical = data["non_critical"].clone();
    let cid = Cid::new(data["cid"].as_str().unwrap_or_default()).map_err(|e| FuseVaultError::Validation(e.to_string()))?;
    let is_delegated_action = data["is_delegated_action"].as_bool().unwrap_or(false);
    let ipfs_version = data["ipfs_version"].as_u64().unwrap_or(1) as u32;
    let action_str = data["action"].as_str().unwrap_or("Update");
    let action = parse_action(action_str);

    let input = UploadInput { asset_id: asset_id.clone(), owner, initiator, critical, non_critical };
    let existing = ctx.assets.find_any_including_deleted(&asset_id)?;
    let plan = Plan {
        branch: match action {
            Action::Create => Branch::FreshCreate,
            Action::RecreateDeleted => Branch::Recreate,
            _ => Branch::CriticalChange,
        },
        existing,
        new_cid: cid.clone(),
        canonical_bytes: Vec::new(),
    };

    let record = build_record(&input, &plan, cid, blockchain_tx_hash.clone(), ipfs_version, now, is_delegated_action);
    let inserted = ctx.assets.create_new_version(&asset_id, move |_| Ok(record.clone()))?;
    if plan.branch == Branch::Recreate {
        ctx.assets.purge_deleted(&asset_id)?;
    }
    ctx.txlog.append(
        &asset_id,
        action,
        &input.owner,
        &input.initiator,
        now,
        json!({"versionNumber": inserted.version_number, "cid": inserted.ipfs_hash.as_str()}),
    )?;
    ctx.pending.remove(pending_tx_id)?;

    Ok(UploadResult { record: inserted, action })
}

fn parse_action(s: &str) -> Action {
    match s {
        "Create" => Action::Create,
        "RecreateDeleted" => Action::RecreateDeleted,
        "Update" => Action::Update,
        _ => Action::VersionCreate,
    }
}

/// Batch upload (§4.9 batch variant): per-asset IPFS uploads run
/// concurrently (bounded by batch size, capped at `MAX_CONCURRENT_UPLOADS`),
/// a single IPFS failure aborts the whole batch before any chain work.
pub async fn upload_batch(
    ctx: Arc<OrchestratorCtx>,
    inputs: Vec<UploadInput>,
    auth: &AuthContext,
    now: Timestamp,
) -> Result<Vec<Outcome<UploadResult>>, FuseVaultError> {
    if inputs.len() > fusevault_core::constants::MAX_BATCH_SIZE {
        return Err(FuseVaultError::BatchTooLarge {
            got: inputs.len(),
            max: fusevault_core::constants::MAX_BATCH_SIZE,
        });
    }

    let plans: Vec<Plan> = stream::iter(inputs.iter().map(|input| {
        let ctx = ctx.clone();
        async move { plan_upload(&ctx, input, auth).await }
    }))
    .buffered(MAX_CONCURRENT_UPLOADS.min(inputs.len().max(1)))
    .collect::<Vec<_>>()
    .await
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;

    let stores = stream::iter(plans.iter().map(|plan| {
        let ctx = ctx.clone();
        let bytes = plan.canonical_bytes.clone();
        async move {
            if plan.branch != Branch::NonCriticalOnly {
                ctx.content.store(&bytes).await?;
            }
            Ok::<(), FuseVaultError>(())
        }
    }))
    .buffered(MAX_CONCURRENT_UPLOADS.min(inputs.len().max(1)))
    .collect::<Vec<_>>()
    .await;
    for result in stores {
        result?;
    }

    let mut results = Vec::with_capacity(inputs.len());
    for (input, plan) in inputs.into_iter().zip(plans.into_iter()) {
        let is_delegated_action = input.initiator != input.owner;
        if plan.branch == Branch::NonCriticalOnly {
            let prev = plan.existing.clone().expect("NonCriticalOnly implies an existing record");
            let record = build_record(&input, &plan, prev.ipfs_hash.clone(), prev.chain_tx_id.clone(), prev.ipfs_version, now, is_delegated_action);
            let inserted = ctx.assets.create_new_version(&input.asset_id, move |_| Ok(record.clone()))?;
            ctx.txlog.append(&input.asset_id, Action::Update, &input.owner, &input.initiator, now, Value::Null)?;
            results.push(Outcome::Done(UploadResult { record: inserted, action: Action::Update }));
            continue;
        }

        let is_first_version = matches!(plan.branch, Branch::FreshCreate | Branch::Recreate);
        let call = anchor_call(&input, is_first_version, &plan.new_cid, auth.is_api_key());
        let action = action_for(plan.branch);

        if auth.is_api_key() {
            let receipt = ctx.chain.execute_server_signed(call).await?;
            let next_ipfs_version = plan.existing.as_ref().map(|r| r.ipfs_version + 1).unwrap_or(1);
            let record = build_record(&input, &plan, plan.new_cid.clone(), receipt.tx_hash, next_ipfs_version, now, is_delegated_action);
            let inserted = ctx.assets.create_new_version(&input.asset_id, move |_| Ok(record.clone()))?;
            if plan.branch == Branch::Recreate {
                ctx.assets.purge_deleted(&input.asset_id)?;
            }
            ctx.txlog.append(&input.asset_id, action, &input.owner, &input.initiator, now, Value::Null)?;
            results.push(Outcome::Done(UploadResult { record: inserted, action }));
        } else {
            let UnsignedTransaction { transaction_hex, estimated_gas, gas_price_wei, function_name } =
                ctx.chain.build_unsigned(call, &input.initiator).await?;
            let resume_data = json!({
                "asset_id": input.asset_id.as_str(),
                "owner": input.owner.as_str(),
                "initiator": input.initiator.as_str(),
                "critical": input.critical,
                "non_critical": input.non_critical,
                "cid": plan.new_cid.as_str(),
                "action": format!("{:?}", action),
                "is_delegated_action": is_delegated_action,
                "ipfs_version": plan.existing.as_ref().map(|r| r.ipfs_version + 1).unwrap_or(1),
            });
            let pending = ctx.pending.store(&input.initiator, "upload_batch", transaction_hex.clone(), resume_data, now, None)?;
            results.push(Outcome::PendingSignature(PendingTxHandle {
                pending_tx_id: pending.tx_id,
                transaction_hex,
                estimated_gas,
                gas_price_wei,
                function_name,
            }));
        }
    }

    Ok(results)
}
