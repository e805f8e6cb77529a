//! Delegate management (§4.6). Unlike upload/delete there is no
//! owner-explicit contract variant for `setDelegate` — the contract only
//! ever records `msg.sender` as the owner granting or revoking delegate
//! status, so this is a wallet-auth-only operation. An API key can never
//! call it on an owner's behalf, since the server signing would register
//! the delegation from the server's own wallet, not the owner's.
//!
//! The cache is a UX-listing mirror only, never consulted for
//! authorization; `complete_set_delegate` syncs it from the just-confirmed
//! receipt the same way the node's background sweep syncs it from scanned
//! `DelegateStatusChanged` logs.

use fusevault_auth::AuthContext;
use fusevault_chain::{ContractCall, ReceiptSummary, UnsignedTransaction};
use fusevault_core::error::FuseVaultError;
use fusevault_core::types::{Timestamp, TxHash, WalletAddress};
use serde_json::json;

use crate::ctx::OrchestratorCtx;
use crate::outcome::{Outcome, PendingTxHandle};

/// Submits a `setDelegate(delegate, status)` call as the owner. Always
/// requires a wallet-signed session; API-key initiators are rejected
/// outright rather than silently signing with the wrong address.
pub async fn set_delegate(
    ctx: &OrchestratorCtx,
    owner: &WalletAddress,
    delegate: &WalletAddress,
    status: bool,
    auth: &AuthContext,
    now: Timestamp,
) -> Result<Outcome<ReceiptSummary>, FuseVaultError> {
    if auth.is_api_key() {
        return Err(FuseVaultError::Unauthorized(
            "delegate management requires a wallet-signed session, not an API key".into(),
        ));
    }
    if auth.wallet_address != *owner {
        return Err(FuseVaultError::Unauthorized(format!(
            "{} may not set delegates on behalf of {}",
            auth.wallet_address, owner
        )));
    }

    let call = ContractCall::SetDelegate { delegate: delegate.clone(), status };
    let UnsignedTransaction { transaction_hex, estimated_gas, gas_price_wei, function_name } =
        ctx.chain.build_unsigned(call, owner).await?;

    let resume_data = json!({
        "owner": owner.as_str(),
        "delegate": delegate.as_str(),
        "status": status,
    });
    let pending = ctx.pending.store(owner, "set_delegate", transaction_hex.clone(), resume_data, now, None)?;

    Ok(Outcome::PendingSignature(PendingTxHandle {
        pending_tx_id: pending.tx_id,
        transaction_hex,
        estimated_gas,
        gas_price_wei,
        function_name,
    }))
}

/// Resumes a `setDelegate` call once the owner has broadcast it themselves:
/// confirms the receipt, syncs the delegation cache from it, and clears the
/// pending record.
pub async fn complete_set_delegate(
    ctx: &OrchestratorCtx,
    pending_tx_id: &str,
    blockchain_tx_hash: &TxHash,
    now: Timestamp,
) -> Result<ReceiptSummary, FuseVaultError> {
    let pending = ctx.pending.get(pending_tx_id, now)?;
    let receipt = ctx.chain.confirm_receipt(blockchain_tx_hash).await?;

    let data = &pending.resume_data;
    let owner = WalletAddress::parse(data["owner"].as_str().unwrap_or_default())
        .map_err(|e| FuseVaultError::Validation(e.to_string()))?;
    let delegate = WalletAddress::parse(data["delegate"].as_str().unwrap_or_default())
        .map_err(|e| FuseVaultError::Validation(e.to_string()))?;
    let status = data["status"].as_bool().unwrap_or(false);
    ctx.delegation
        .sync_from_event(&owner, &delegate, status, Some(receipt.tx_hash.clone()), None, now)?;

    ctx.pending.remove(&pending.tx_id)?;
    Ok(receipt)
}
