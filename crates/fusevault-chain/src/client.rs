use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;

use fusevault_core::constants::{
    CHAIN_READ_TIMEOUT_SECS, CHAIN_RECEIPT_TIMEOUT_SECS, EVENT_SCAN_BATCH_BLOCKS, EVENT_SCAN_MAX_WINDOWS,
};
use fusevault_core::error::FuseVaultError;
use fusevault_core::types::{AssetId, Cid, TxHash, WalletAddress};

use crate::abi::{DelegateStatusChangedFilter, FuseVaultRegistry, IPFSUpdatedFilter};
use crate::nonce::NonceManager;
use crate::types::{
    ContractCall, DelegateStatusChangedEvent, IpfsInfo, ReceiptSummary, RecoveredCid, TransactionDetails,
    UnsignedTransaction, VerifyCidResult,
};

type ReadProvider = Provider<Http>;
type SignerClient = SignerMiddleware<ReadProvider, LocalWallet>;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Execution mode 1 (§4.2): build, sign with the server key, broadcast,
    /// wait for receipt.
    async fn execute_server_signed(&self, call: ContractCall) -> Result<ReceiptSummary, FuseVaultError>;

    /// Execution mode 2 (§4.2): build the unsigned transaction and estimate
    /// gas; the caller stores it in the pending-transaction coordinator.
    async fn build_unsigned(&self, call: ContractCall, from: &WalletAddress) -> Result<UnsignedTransaction, FuseVaultError>;

    /// Completes a user-signed flow: broadcasts caller-signed raw tx bytes
    /// and waits for the receipt.
    async fn broadcast_signed(&self, raw_tx_hex: &str) -> Result<ReceiptSummary, FuseVaultError>;

    /// Completes a user-signed flow where the wallet broadcast the
    /// transaction itself and only reports back the resulting hash — the
    /// orchestrator just needs the receipt confirmed.
    async fn confirm_receipt(&self, tx_hash: &TxHash) -> Result<ReceiptSummary, FuseVaultError>;

    async fn get_ipfs_info(&self, owner: &WalletAddress, asset_id: &AssetId) -> Result<IpfsInfo, FuseVaultError>;

    async fn verify_cid(
        &self,
        owner: &WalletAddress,
        asset_id: &AssetId,
        cid: &Cid,
        claimed_version: u64,
    ) -> Result<VerifyCidResult, FuseVaultError>;

    async fn get_transaction_details(
        &self,
        tx_hash: &TxHash,
        expected_asset_id: &AssetId,
    ) -> Result<TransactionDetails, FuseVaultError>;

    async fn recover_from_events(&self, asset_id: &AssetId, owner: &WalletAddress) -> Result<RecoveredCid, FuseVaultError>;

    async fn is_delegate(&self, owner: &WalletAddress, delegate: &WalletAddress) -> Result<bool, FuseVaultError>;

    fn server_wallet_address(&self) -> WalletAddress;

    async fn scan_delegate_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DelegateStatusChangedEvent>, FuseVaultError>;

    /// Current chain head, used by the delegate-event sweep to know how far
    /// forward it can scan.
    async fn latest_block_number(&self) -> Result<u64, FuseVaultError>;
}

/// `ethers`-backed implementation talking JSON-RPC to an Ethereum-compatible
/// node.
pub struct EthersChainClient {
    read_provider: Arc<ReadProvider>,
    signer_client: Arc<SignerClient>,
    server_address: Address,
    contract_address: Address,
    nonce: NonceManager,
}

impl EthersChainClient {
    pub async fn connect(
        rpc_url: &str,
        contract_address: Address,
        server_signing_key: LocalWallet,
    ) -> Result<Self, FuseVaultError> {
        let read_provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
            .interval(Duration::from_millis(250));

        let chain_id = read_provider
            .get_chainid()
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
            .as_u64();

        let wallet = server_signing_key.with_chain_id(chain_id);
        let server_address = wallet.address();
        let signer_client = SignerMiddleware::new(read_provider.clone(), wallet);

        Ok(Self {
            read_provider: Arc::new(read_provider),
            signer_client: Arc::new(signer_client),
            server_address,
            contract_address,
            nonce: NonceManager::new(),
        })
    }

    fn registry_read(&self) -> FuseVaultRegistry<ReadProvider> {
        FuseVaultRegistry::new(self.contract_address, self.read_provider.clone())
    }

    fn registry_signed(&self) -> FuseVaultRegistry<SignerClient> {
        FuseVaultRegistry::new(self.contract_address, self.signer_client.clone())
    }

    fn build_call<M: Middleware>(
        contract: &FuseVaultRegistry<M>,
        call: &ContractCall,
    ) -> ContractCall_<M> {
        match call.clone() {
            ContractCall::StoreCidDigest { asset_id, cid } => {
                contract.store_cid_digest(asset_id.as_str().to_string(), cid.as_str().to_string())
            }
            ContractCall::UpdateIpfs { asset_id, cid } => {
                contract.update_ipfs(asset_id.as_str().to_string(), cid.as_str().to_string())
            }
            ContractCall::UpdateIpfsFor { owner, asset_id, cid } => contract.update_ipfs_for(
                owner.as_str().parse().expect("validated address"),
                asset_id.as_str().to_string(),
                cid.as_str().to_string(),
            ),
            ContractCall::DeleteAsset { asset_id } => contract.delete_asset(asset_id.as_str().to_string()),
            ContractCall::DeleteAssetFor { owner, asset_id } => contract.delete_asset_for(
                owner.as_str().parse().expect("validated address"),
                asset_id.as_str().to_string(),
            ),
            ContractCall::BatchDeleteAssets { asset_ids } => {
                contract.batch_delete_assets(asset_ids.iter().map(|a| a.as_str().to_string()).collect())
            }
            ContractCall::BatchDeleteAssetsFor { owner, asset_ids } => contract.batch_delete_assets_for(
                owner.as_str().parse().expect("validated address"),
                asset_ids.iter().map(|a| a.as_str().to_string()).collect(),
            ),
            ContractCall::SetDelegate { delegate, status } => {
                contract.set_delegate(delegate.as_str().parse().expect("validated address"), status)
            }
        }
    }
}

/// `ethers::contract::builders::ContractCall` specialized over middleware
/// `M`; aliased here purely to keep `build_call`'s signature readable.
type ContractCall_<M> = ethers::contract::builders::ContractCall<M, ()>;

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn execute_server_signed(&self, call: ContractCall) -> Result<ReceiptSummary, FuseVaultError> {
        let contract = self.registry_signed();
        let built = Self::build_call(&contract, &call);

        let nonce = self.nonce.reserve(&*self.read_provider, self.server_address).await?;
        let built = built.nonce(nonce);

        let pending = built
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("revert") {
                    FuseVaultError::ChainRevert(msg)
                } else {
                    FuseVaultError::ChainUnavailable(msg)
                }
            })?;

        let receipt = tokio::time::timeout(
            Duration::from_secs(CHAIN_RECEIPT_TIMEOUT_SECS),
            pending,
        )
        .await
        .map_err(|_| FuseVaultError::ChainTimeout(call.function_name().to_string()))?
        .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
        .ok_or_else(|| FuseVaultError::ChainUnavailable("transaction dropped from mempool".into()))?;

        if receipt.status != Some(U64::from(1)) {
            self.nonce.invalidate().await;
            return Err(FuseVaultError::ChainRevert(format!(
                "{} reverted, tx {:#x}",
                call.function_name(),
                receipt.transaction_hash
            )));
        }

        Ok(ReceiptSummary {
            tx_hash: TxHash::parse(&format!("{:#x}", receipt.transaction_hash))
                .expect("ethers tx hash is always 32 bytes"),
            gas_used: receipt.gas_used.unwrap_or_default().as_u64(),
            status: true,
        })
    }

    async fn build_unsigned(&self, call: ContractCall, from: &WalletAddress) -> Result<UnsignedTransaction, FuseVaultError> {
        let contract = self.registry_read();
        let built = Self::build_call(&contract, &call);
        let from_addr: Address = from.as_str().parse().expect("validated address");

        let tx: TypedTransaction = built.tx.clone();
        let mut tx = tx;
        tx.set_from(from_addr);

        let estimated_gas = self
            .read_provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;
        // Safety margin per §4.2 mode 2: add 20%.
        let estimated_gas = estimated_gas * 120 / 100;
        tx.set_gas(estimated_gas);

        let gas_price = self
            .read_provider
            .get_gas_price()
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;
        tx.set_gas_price(gas_price);

        let nonce = self
            .read_provider
            .get_transaction_count(from_addr, None)
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;
        tx.set_nonce(nonce);

        let rlp = tx.rlp();
        Ok(UnsignedTransaction {
            transaction_hex: format!("0x{}", hex::encode(rlp)),
            estimated_gas: estimated_gas.as_u64(),
            gas_price_wei: gas_price.as_u128(),
            function_name: call.function_name(),
        })
    }

    async fn broadcast_signed(&self, raw_tx_hex: &str) -> Result<ReceiptSummary, FuseVaultError> {
        let bytes = hex::decode(raw_tx_hex.trim_start_matches("0x"))
            .map_err(|e| FuseVaultError::Validation(format!("invalid signed transaction hex: {e}")))?;

        let pending = self
            .read_provider
            .send_raw_transaction(bytes.into())
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;

        let receipt = tokio::time::timeout(Duration::from_secs(CHAIN_RECEIPT_TIMEOUT_SECS), pending)
            .await
            .map_err(|_| FuseVaultError::ChainTimeout("broadcast_signed".into()))?
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
            .ok_or_else(|| FuseVaultError::ChainUnavailable("transaction dropped from mempool".into()))?;

        if receipt.status != Some(U64::from(1)) {
            return Err(FuseVaultError::ChainRevert(format!("tx {:#x} reverted", receipt.transaction_hash)));
        }

        Ok(ReceiptSummary {
            tx_hash: TxHash::parse(&format!("{:#x}", receipt.transaction_hash))
                .expect("ethers tx hash is always 32 bytes"),
            gas_used: receipt.gas_used.unwrap_or_default().as_u64(),
            status: true,
        })
    }

    async fn confirm_receipt(&self, tx_hash: &TxHash) -> Result<ReceiptSummary, FuseVaultError> {
        let hash: H256 = tx_hash.as_str().parse().map_err(|_| FuseVaultError::Validation("bad tx hash".into()))?;

        let receipt = tokio::time::timeout(
            Duration::from_secs(CHAIN_RECEIPT_TIMEOUT_SECS),
            self.read_provider.get_transaction_receipt(hash),
        )
        .await
        .map_err(|_| FuseVaultError::ChainTimeout("confirm_receipt".into()))?
        .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
        .ok_or_else(|| FuseVaultError::TransactionNotFound(tx_hash.to_string()))?;

        if receipt.status != Some(U64::from(1)) {
            return Err(FuseVaultError::ChainRevert(format!("tx {:#x} reverted", receipt.transaction_hash)));
        }

        Ok(ReceiptSummary {
            tx_hash: tx_hash.clone(),
            gas_used: receipt.gas_used.unwrap_or_default().as_u64(),
            status: true,
        })
    }

    async fn get_ipfs_info(&self, owner: &WalletAddress, asset_id: &AssetId) -> Result<IpfsInfo, FuseVaultError> {
        let owner_addr: Address = owner.as_str().parse().expect("validated address");
        let (cid, version, is_deleted) = tokio::time::timeout(
            Duration::from_secs(CHAIN_READ_TIMEOUT_SECS),
            self.registry_read()
                .get_ipfs_info(owner_addr, asset_id.as_str().to_string())
                .call(),
        )
        .await
        .map_err(|_| FuseVaultError::ChainTimeout("getIPFSInfo".into()))?
        .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;

        Ok(IpfsInfo {
            cid: Cid::new(cid).map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?,
            version: version.as_u64(),
            is_deleted,
        })
    }

    async fn verify_cid(
        &self,
        owner: &WalletAddress,
        asset_id: &AssetId,
        cid: &Cid,
        claimed_version: u64,
    ) -> Result<VerifyCidResult, FuseVaultError> {
        let owner_addr: Address = owner.as_str().parse().expect("validated address");
        let (is_valid, actual_version, is_deleted, message) = tokio::time::timeout(
            Duration::from_secs(CHAIN_READ_TIMEOUT_SECS),
            self.registry_read()
                .verify_cid(
                    owner_addr,
                    asset_id.as_str().to_string(),
                    cid.as_str().to_string(),
                    U256::from(claimed_version),
                )
                .call(),
        )
        .await
        .map_err(|_| FuseVaultError::ChainTimeout("verifyCID".into()))?
        .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;

        Ok(VerifyCidResult {
            is_valid,
            actual_version: actual_version.as_u64(),
            is_deleted,
            message,
        })
    }

    async fn get_transaction_details(
        &self,
        tx_hash: &TxHash,
        expected_asset_id: &AssetId,
    ) -> Result<TransactionDetails, FuseVaultError> {
        let hash: H256 = tx_hash.as_str().parse().map_err(|_| FuseVaultError::Validation("bad tx hash".into()))?;

        let tx = self
            .read_provider
            .get_transaction(hash)
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
            .ok_or_else(|| FuseVaultError::TransactionNotFound(tx_hash.to_string()))?;

        let decoded = self
            .registry_read()
            .decode_function_input_raw(&tx.input)
            .map_err(|e| FuseVaultError::ChainUnavailable(format!("could not decode calldata: {e}")))?;

        let (asset_id, cid) = decode_asset_and_cid(&decoded)
            .ok_or_else(|| FuseVaultError::ChainUnavailable("calldata did not carry an assetId/cid pair".into()))?;

        if asset_id != expected_asset_id.as_str() {
            return Err(FuseVaultError::ChainUnavailable(format!(
                "calldata asset_id {asset_id} does not match expected {expected_asset_id}"
            )));
        }

        let sender = tx.from;
        Ok(TransactionDetails {
            cid: Cid::new(cid).map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?,
            tx_sender: WalletAddress::parse(&format!("{:#x}", sender))
                .expect("ethers address is always well formed"),
        })
    }

    async fn recover_from_events(&self, asset_id: &AssetId, owner: &WalletAddress) -> Result<RecoveredCid, FuseVaultError> {
        let latest = self
            .read_provider
            .get_block_number()
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?
            .as_u64();

        let mut to_block = latest;
        for _ in 0..EVENT_SCAN_MAX_WINDOWS {
            let from_block = to_block.saturating_sub(EVENT_SCAN_BATCH_BLOCKS);

            let events: Vec<(IPFSUpdatedFilter, LogMeta)> = self
                .registry_read()
                .event::<IPFSUpdatedFilter>()
                .from_block(from_block)
                .to_block(to_block)
                .address(self.contract_address.into())
                .query_with_meta()
                .await
                .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;

            let owner_addr: Address = owner.as_str().parse().expect("validated address");
            if let Some((ev, meta)) = events
                .into_iter()
                .filter(|(ev, _)| ev.owner == owner_addr && ev.asset_id == asset_id.as_str())
                .last()
            {
                return Ok(RecoveredCid {
                    cid: Cid::new(ev.cid).map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?,
                    tx_hash: TxHash::parse(&format!("{:#x}", meta.transaction_hash))
                        .expect("ethers tx hash is always 32 bytes"),
                });
            }

            if from_block == 0 {
                break;
            }
            to_block = from_block.saturating_sub(1);
        }

        Err(FuseVaultError::ChainUnavailable(format!(
            "no IPFSUpdated event found for asset {asset_id} within the lookback window"
        )))
    }

    async fn is_delegate(&self, owner: &WalletAddress, delegate: &WalletAddress) -> Result<bool, FuseVaultError> {
        let owner_addr: Address = owner.as_str().parse().expect("validated address");
        let delegate_addr: Address = delegate.as_str().parse().expect("validated address");
        tokio::time::timeout(
            Duration::from_secs(CHAIN_READ_TIMEOUT_SECS),
            self.registry_read().delegates(owner_addr, delegate_addr).call(),
        )
        .await
        .map_err(|_| FuseVaultError::ChainTimeout("delegates".into()))?
        .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))
    }

    fn server_wallet_address(&self) -> WalletAddress {
        WalletAddress::parse(&format!("{:#x}", self.server_address)).expect("ethers address is always well formed")
    }

    async fn scan_delegate_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DelegateStatusChangedEvent>, FuseVaultError> {
        let events: Vec<(DelegateStatusChangedFilter, LogMeta)> = self
            .registry_read()
            .event::<DelegateStatusChangedFilter>()
            .from_block(from_block)
            .to_block(to_block)
            .address(self.contract_address.into())
            .query_with_meta()
            .await
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))?;

        events
            .into_iter()
            .map(|(ev, meta)| {
                Ok(DelegateStatusChangedEvent {
                    owner: WalletAddress::parse(&format!("{:#x}", ev.owner))
                        .expect("ethers address is always well formed"),
                    delegate: WalletAddress::parse(&format!("{:#x}", ev.delegate))
                        .expect("ethers address is always well formed"),
                    status: ev.status,
                    block_number: meta.block_number.as_u64(),
                    tx_hash: TxHash::parse(&format!("{:#x}", meta.transaction_hash))
                        .expect("ethers tx hash is always 32 bytes"),
                })
            })
            .collect()
    }

    async fn latest_block_number(&self) -> Result<u64, FuseVaultError> {
        self.read_provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| FuseVaultError::ChainUnavailable(e.to_string()))
    }
}

/// Pulls `(assetId, cid)` out of any of this registry's decoded
/// `assetId`/`cid`-carrying function inputs.
fn decode_asset_and_cid(tokens: &[ethers::abi::Token]) -> Option<(String, String)> {
    use ethers::abi::Token;
    let strings: Vec<String> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    match strings.as_slice() {
        [asset_id, cid] => Some((asset_id.clone(), cid.clone())),
        _ => None,
    }
}
