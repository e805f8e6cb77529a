use fusevault_core::types::{AssetId, Cid, WalletAddress};

/// Ground-truth on-chain state for an asset (§4.11 step 2).
#[derive(Debug, Clone)]
pub struct IpfsInfo {
    pub cid: Cid,
    pub version: u64,
    pub is_deleted: bool,
}

/// Result of `verifyCID` (§4.11 step 3).
#[derive(Debug, Clone)]
pub struct VerifyCidResult {
    pub is_valid: bool,
    pub actual_version: u64,
    pub is_deleted: bool,
    pub message: String,
}

/// Decoded calldata of a prior anchoring transaction (§4.11 step 4).
#[derive(Debug, Clone)]
pub struct TransactionDetails {
    pub cid: Cid,
    pub tx_sender: WalletAddress,
}

/// Result of scanning event logs for the authentic CID (§4.2, §4.11 step 10).
#[derive(Debug, Clone)]
pub struct RecoveredCid {
    pub cid: Cid,
    pub tx_hash: fusevault_core::types::TxHash,
}

/// Outcome of a server-signed, confirmed transaction.
#[derive(Debug, Clone)]
pub struct ReceiptSummary {
    pub tx_hash: fusevault_core::types::TxHash,
    pub gas_used: u64,
    pub status: bool,
}

/// An unsigned transaction handed back to a wallet-auth caller for signing
/// (§4.2 execution mode 2).
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// RLP-encoded unsigned transaction, hex `0x`-prefixed.
    pub transaction_hex: String,
    pub estimated_gas: u64,
    pub gas_price_wei: u128,
    pub function_name: &'static str,
}

#[derive(Debug, Clone)]
pub struct DelegateStatusChangedEvent {
    pub owner: WalletAddress,
    pub delegate: WalletAddress,
    pub status: bool,
    pub block_number: u64,
    pub tx_hash: fusevault_core::types::TxHash,
}

/// The closed set of state-changing contract calls (§4.2). Modeling this as
/// an enum rather than one method per call keeps the server-signed and
/// user-signed execution paths (§4.2 modes 1/2) from duplicating dispatch
/// logic — both paths build the same `ethers` call, they only differ in
/// what happens to it afterward.
#[derive(Debug, Clone)]
pub enum ContractCall {
    StoreCidDigest { asset_id: AssetId, cid: Cid },
    UpdateIpfs { asset_id: AssetId, cid: Cid },
    UpdateIpfsFor { owner: WalletAddress, asset_id: AssetId, cid: Cid },
    DeleteAsset { asset_id: AssetId },
    DeleteAssetFor { owner: WalletAddress, asset_id: AssetId },
    BatchDeleteAssets { asset_ids: Vec<AssetId> },
    BatchDeleteAssetsFor { owner: WalletAddress, asset_ids: Vec<AssetId> },
    SetDelegate { delegate: WalletAddress, status: bool },
}

impl ContractCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::StoreCidDigest { .. } => "storeCIDDigest",
            ContractCall::UpdateIpfs { .. } => "updateIPFS",
            ContractCall::UpdateIpfsFor { .. } => "updateIPFSFor",
            ContractCall::DeleteAsset { .. } => "deleteAsset",
            ContractCall::DeleteAssetFor { .. } => "deleteAssetFor",
            ContractCall::BatchDeleteAssets { .. } => "batchDeleteAssets",
            ContractCall::BatchDeleteAssetsFor { .. } => "batchDeleteAssetsFor",
            ContractCall::SetDelegate { .. } => "setDelegate",
        }
    }
}
