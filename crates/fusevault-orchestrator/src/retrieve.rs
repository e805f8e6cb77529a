//! The retrieval/verification/recovery algorithm (§4.11) — the read path
//! doubles as the system's load-bearing integrity check.

use fusevault_core::canonical::canonical_payload_bytes;
use fusevault_core::error::FuseVaultError;
use fusevault_core::model::{Action, AssetVersionRecord};
use fusevault_core::types::{AssetId, Timestamp, VersionNumber};

use crate::ctx::OrchestratorCtx;

const TOTAL_STEPS: u8 = 9;

/// Called at each numbered step with `(step, total, message)`, mirroring
/// the original's streaming progress parameter.
pub type ProgressFn<'a> = dyn Fn(u8, u8, &str) + 'a;

#[derive(Debug, Clone, Default)]
pub struct VerificationVerdict {
    pub ipfs_hash_verified: bool,
    pub cid_match: bool,
    pub tx_sender_verified: bool,
    pub deletion_status_tampered: bool,
    pub verified: bool,
    pub recovery_attempted: bool,
    pub recovery_successful: bool,
}

#[derive(Debug, Clone)]
pub struct RetrieveResult {
    pub record: AssetVersionRecord,
    pub verdict: VerificationVerdict,
}

fn report(progress: Option<&ProgressFn<'_>>, step: u8, message: &str) {
    if let Some(f) = progress {
        f(step, TOTAL_STEPS, message);
    }
}

/// Runs the 11-step retrieve/verify/recover algorithm for one version of one
/// asset. `version = None` means "the current version".
pub async fn retrieve_metadata(
    ctx: &OrchestratorCtx,
    asset_id: &AssetId,
    version: Option<VersionNumber>,
    auto_recover: bool,
    now: Timestamp,
    progress: Option<&ProgressFn<'_>>,
) -> Result<RetrieveResult, FuseVaultError> {
    // Step 1: existence vs visibility.
    report(progress, 1, "fetching requested version");
    if ctx.assets.find_any_including_deleted(asset_id)?.is_none() {
        return Err(FuseVaultError::AssetNotFound(asset_id.to_string()));
    }
    let record = match version {
        Some(v) => ctx.assets.find_version(asset_id, v)?.ok_or_else(|| FuseVaultError::VersionNotFound {
            asset_id: asset_id.to_string(),
            version: v,
        })?,
        None => ctx
            .assets
            .find_any_including_deleted(asset_id)?
            .expect("checked above"),
    };

    // Step 2: on-chain ground truth.
    report(progress, 2, "reading chain IPFS info");
    let chain_info = ctx.chain.get_ipfs_info(&record.owner_address, asset_id).await?;

    // Step 3: verifyCID.
    report(progress, 3, "verifying CID on-chain");
    let verify_result = ctx
        .chain
        .verify_cid(&record.owner_address, asset_id, &record.ipfs_hash, record.ipfs_version as u64)
        .await?;
    let ipfs_hash_verified = verify_result.is_valid;

    // Step 4: calldata cross-check. A stale or tampered `chain_tx_id` (e.g.
    // pointing at an unrelated transaction) surfaces here as a lookup
    // failure rather than a hard error — it just fails verification and, if
    // this is the current version, falls through to event-scan recovery at
    // step 10.
    report(progress, 4, "reading anchoring transaction");
    let tx_details = ctx.chain.get_transaction_details(&record.chain_tx_id, asset_id).await.ok();
    let tx_sender_verified = tx_details
        .as_ref()
        .is_some_and(|d| d.tx_sender == ctx.chain.server_wallet_address());

    // Step 5: recompute the CID from the DB's own critical metadata.
    report(progress, 5, "recomputing CID from stored metadata");
    let canonical = canonical_payload_bytes(asset_id, &record.owner_address, &record.critical_metadata);
    let computed_cid = ctx.content.compute_cid(&canonical).await?;
    let cid_match = tx_details.as_ref().is_some_and(|d| computed_cid == d.cid);

    // Step 6: deletion-status tamper check.
    report(progress, 6, "checking deletion-status consistency");
    let deletion_status_tampered = chain_info.is_deleted && !record.is_deleted;

    // Step 7: verdict.
    report(progress, 7, "computing verdict");
    let verified = if record.is_current {
        ipfs_hash_verified && cid_match && !deletion_status_tampered
    } else {
        cid_match && tx_sender_verified && !deletion_status_tampered
    };

    let mut verdict = VerificationVerdict {
        ipfs_hash_verified,
        cid_match,
        tx_sender_verified,
        deletion_status_tampered,
        verified,
        recovery_attempted: false,
        recovery_successful: false,
    };

    // Step 8: short-circuit if verified or recovery is disabled.
    if verified || !auto_recover {
        report(progress, 8, "verification complete");
        return Ok(RetrieveResult { record, verdict });
    }

    // Historical versions never trigger recovery (step 11).
    if !record.is_current {
        report(progress, 8, "historical version, recovery skipped");
        return Ok(RetrieveResult { record, verdict });
    }

    verdict.recovery_attempted = true;

    if deletion_status_tampered {
        // Step 9: deletion-tamper recovery.
        report(progress, 9, "restoring deletion status");
        ctx.assets.soft_delete(asset_id, &record.owner_address, now)?;
        ctx.txlog.append(
            asset_id,
            Action::DeletionStatusRestored,
            &record.owner_address,
            &record.owner_address,
            now,
            serde_json::json!({"onChainDeleted": chain_info.is_deleted}),
        )?;
        let mut record = record;
        record.is_deleted = true;
        record.deleted_at = Some(now);
        verdict.recovery_successful = true;
        return Ok(RetrieveResult { record, verdict });
    }

    // Step 10: CID-tamper recovery (current version only).
    report(progress, 9, "recovering authentic CID");
    let recovered = match ctx.chain.get_transaction_details(&record.chain_tx_id, asset_id).await {
        Ok(details) => (details.cid, record.chain_tx_id.clone()),
        Err(_) => {
            let recovered = ctx.chain.recover_from_events(asset_id, &record.owner_address).await?;
            (recovered.cid, recovered.tx_hash)
        }
    };
    let (authentic_cid, corrected_tx_hash) = recovered;

    let payload = ctx.content.retrieve(&authentic_cid).await?;
    if payload.get("retrieval_error").is_some() {
        ctx.txlog.append(
            asset_id,
            Action::IntegrityRecovery,
            &record.owner_address,
            &record.owner_address,
            now,
            serde_json::json!({
                "reason": "retrieved metadata invalid",
                "authenticCid": authentic_cid.as_str(),
            }),
        )?;
        return Ok(RetrieveResult { record, verdict });
    }

    let authentic_critical = payload
        .get("critical_metadata")
        .cloned()
        .unwrap_or(payload);

    let before_cid = record.ipfs_hash.clone();
    let before_tx = record.chain_tx_id.clone();
    let asset_id_owned = asset_id.clone();
    let non_critical = record.non_critical_metadata.clone();
    let owner = record.owner_address.clone();
    let performed_by = record.owner_address.clone();
    let ipfs_version = chain_info.version as u32;

    let recovered_record = ctx.assets.create_new_version(&asset_id_owned, move |current| {
        let prev = current.ok_or_else(|| FuseVaultError::AssetNotFound(asset_id_owned.to_string()))?;
        let mut next = prev.clone();
        next.version_number = prev.version_number + 1;
        next.ipfs_version = ipfs_version;
        next.critical_metadata = authentic_critical.clone();
        next.non_critical_metadata = non_critical.clone();
        next.ipfs_hash = authentic_cid.clone();
        next.chain_tx_id = corrected_tx_hash.clone();
        next.previous_version_id = Some(prev.version_number);
        next.document_history.push(prev.version_number);
        next.performed_by = performed_by.clone();
        next.last_updated = now;
        next.last_verified = Some(now);
        Ok(next)
    })?;

    ctx.txlog.append(
        &asset_id_owned,
        Action::IntegrityRecovery,
        &owner,
        &owner,
        now,
        serde_json::json!({
            "beforeCid": before_cid.as_str(),
            "afterCid": recovered_record.ipfs_hash.as_str(),
            "beforeTxHash": before_tx.as_str(),
            "afterTxHash": recovered_record.chain_tx_id.as_str(),
        }),
    )?;

    verdict.recovery_successful = true;
    Ok(RetrieveResult { record: recovered_record, verdict })
}
