//! In-memory fakes for `ContentStore`/`ChainClient`, used to exercise the
//! orchestrators end to end without a real IPFS gateway or chain node.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use fusevault_chain::{
    ChainClient, ContractCall, DelegateStatusChangedEvent, IpfsInfo, ReceiptSummary, RecoveredCid,
    TransactionDetails, UnsignedTransaction, VerifyCidResult,
};
use fusevault_content::ContentStore;
use fusevault_core::error::FuseVaultError;
use fusevault_core::types::{AssetId, Cid, TxHash, WalletAddress};

/// Content-addressed in-memory store. `compute_cid`/`store` both hash with
/// the same function so they can never disagree, mirroring the real
/// client's invariant.
#[derive(Default)]
pub struct FakeContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

fn fake_cid(bytes: &[u8]) -> Cid {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Cid::new(format!("bafyfake{:016x}", hasher.finish())).unwrap()
}

impl FakeContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn store(&self, payload: &[u8]) -> Result<Cid, FuseVaultError> {
        let cid = fake_cid(payload);
        self.blobs.lock().unwrap().insert(cid.as_str().to_string(), payload.to_vec());
        Ok(cid)
    }

    async fn compute_cid(&self, payload: &[u8]) -> Result<Cid, FuseVaultError> {
        Ok(fake_cid(payload))
    }

    async fn retrieve(&self, cid: &Cid) -> Result<Value, FuseVaultError> {
        let blobs = self.blobs.lock().unwrap();
        match blobs.get(cid.as_str()) {
            Some(bytes) => Ok(serde_json::from_slice(bytes).unwrap_or_else(|e| {
                serde_json::json!({
                    "critical_metadata": {"recovered_content": String::from_utf8_lossy(bytes).to_string()},
                    "retrieval_error": e.to_string(),
                })
            })),
            None => Err(FuseVaultError::ContentUnavailable(format!("no blob for {cid}"))),
        }
    }
}

impl FakeContentStore {
    /// Lets a test plant a tampered blob directly under a CID, bypassing
    /// `store`'s hash-derived addressing, to simulate DB/IPFS divergence.
    pub fn put_raw(&self, cid: &Cid, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(cid.as_str().to_string(), bytes);
    }
}

#[derive(Clone, Debug)]
struct ChainAsset {
    cid: Cid,
    version: u64,
    is_deleted: bool,
}

/// A single simulated anchoring event, keyed by tx hash — enough to satisfy
/// `get_transaction_details` and `recover_from_events`.
#[derive(Clone, Debug)]
struct ChainEvent {
    owner: WalletAddress,
    asset_id: AssetId,
    cid: Cid,
    tx_hash: TxHash,
    sender: WalletAddress,
}

pub struct FakeChainClient {
    server_address: WalletAddress,
    delegates: Mutex<std::collections::HashSet<(String, String)>>,
    assets: Mutex<HashMap<(String, String), ChainAsset>>,
    events: Mutex<Vec<ChainEvent>>,
    next_tx: Mutex<u64>,
}

impl FakeChainClient {
    pub fn new(server_address: WalletAddress) -> Self {
        Self {
            server_address,
            delegates: Mutex::new(std::collections::HashSet::new()),
            assets: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            next_tx: Mutex::new(1),
        }
    }

    pub fn add_delegate(&self, owner: &WalletAddress, delegate: &WalletAddress) {
        self.delegates
            .lock()
            .unwrap()
            .insert((owner.as_str().to_string(), delegate.as_str().to_string()));
    }

    fn next_tx_hash(&self) -> TxHash {
        let mut n = self.next_tx.lock().unwrap();
        let hash = TxHash::parse(&format!("0x{:064x}", *n)).unwrap();
        *n += 1;
        hash
    }

    fn key(owner: &WalletAddress, asset_id: &AssetId) -> (String, String) {
        (owner.as_str().to_string(), asset_id.as_str().to_string())
    }

    fn record_anchor(&self, owner: &WalletAddress, asset_id: &AssetId, cid: &Cid, sender: &WalletAddress) -> TxHash {
        let tx_hash = self.next_tx_hash();
        let key = Self::key(owner, asset_id);
        let mut assets = self.assets.lock().unwrap();
        let version = assets.get(&key).map(|a| a.version + 1).unwrap_or(1);
        assets.insert(key, ChainAsset { cid: cid.clone(), version, is_deleted: false });
        self.events.lock().unwrap().push(ChainEvent {
            owner: owner.clone(),
            asset_id: asset_id.clone(),
            cid: cid.clone(),
            tx_hash: tx_hash.clone(),
            sender: sender.clone(),
        });
        tx_hash
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn execute_server_signed(&self, call: ContractCall) -> Result<ReceiptSummary, FuseVaultError> {
        let tx_hash = match call {
            ContractCall::StoreCidDigest { asset_id, cid } => {
                // Owner-less, but this path is only reached if a test calls
                // it directly with initiator == owner under wallet auth,
                // which never routes through here.
                self.record_anchor(&self.server_address.clone(), &asset_id, &cid, &self.server_address)
            }
            ContractCall::UpdateIpfs { asset_id, cid } => {
                self.record_anchor(&self.server_address.clone(), &asset_id, &cid, &self.server_address)
            }
            ContractCall::UpdateIpfsFor { owner, asset_id, cid } => {
                self.record_anchor(&owner, &asset_id, &cid, &self.server_address)
            }
            ContractCall::DeleteAsset { asset_id } => {
                let owner = self.server_address.clone();
                self.mark_deleted(&owner, &asset_id);
                self.next_tx_hash()
            }
            ContractCall::DeleteAssetFor { owner, asset_id } => {
                self.mark_deleted(&owner, &asset_id);
                self.next_tx_hash()
            }
            ContractCall::BatchDeleteAssets { asset_ids } => {
                let owner = self.server_address.clone();
                for asset_id in &asset_ids {
                    self.mark_deleted(&owner, asset_id);
                }
                self.next_tx_hash()
            }
            ContractCall::BatchDeleteAssetsFor { owner, asset_ids } => {
                for asset_id in &asset_ids {
                    self.mark_deleted(&owner, asset_id);
                }
                self.next_tx_hash()
            }
            ContractCall::SetDelegate { delegate, status } => {
                if status {
                    self.add_delegate(&self.server_address.clone(), &delegate);
                }
                self.next_tx_hash()
            }
        };
        Ok(ReceiptSummary { tx_hash, gas_used: 21_000, status: true })
    }

    async fn build_unsigned(&self, call: ContractCall, from: &WalletAddress) -> Result<UnsignedTransaction, FuseVaultError> {
        Ok(UnsignedTransaction {
            transaction_hex: format!("0xunsigned-{}", from.as_str()),
            estimated_gas: 21_000,
            gas_price_wei: 1,
            function_name: call.function_name(),
        })
    }

    async fn broadcast_signed(&self, _raw_tx_hex: &str) -> Result<ReceiptSummary, FuseVaultError> {
        Ok(ReceiptSummary { tx_hash: self.next_tx_hash(), gas_used: 21_000, status: true })
    }

    async fn confirm_receipt(&self, tx_hash: &TxHash) -> Result<ReceiptSummary, FuseVaultError> {
        Ok(ReceiptSummary { tx_hash: tx_hash.clone(), gas_used: 21_000, status: true })
    }

    async fn get_ipfs_info(&self, owner: &WalletAddress, asset_id: &AssetId) -> Result<IpfsInfo, FuseVaultError> {
        let assets = self.assets.lock().unwrap();
        match assets.get(&Self::key(owner, asset_id)) {
            Some(a) => Ok(IpfsInfo { cid: a.cid.clone(), version: a.version, is_deleted: a.is_deleted }),
            None => Err(FuseVaultError::ChainUnavailable(format!("no on-chain record for {asset_id}"))),
        }
    }

    async fn verify_cid(
        &self,
        owner: &WalletAddress,
        asset_id: &AssetId,
        cid: &Cid,
        claimed_version: u64,
    ) -> Result<VerifyCidResult, FuseVaultError> {
        let assets = self.assets.lock().unwrap();
        let a = assets
            .get(&Self::key(owner, asset_id))
            .ok_or_else(|| FuseVaultError::ChainUnavailable(format!("no on-chain record for {asset_id}")))?;
        Ok(VerifyCidResult {
            is_valid: a.cid == *cid && a.version == claimed_version,
            actual_version: a.version,
            is_deleted: a.is_deleted,
            message: String::new(),
        })
    }

    async fn get_transaction_details(
        &self,
        tx_hash: &TxHash,
        expected_asset_id: &AssetId,
    ) -> Result<TransactionDetails, FuseVaultError> {
        let events = self.events.lock().unwrap();
        let ev = events
            .iter()
            .find(|e| e.tx_hash == *tx_hash)
            .ok_or_else(|| FuseVaultError::TransactionNotFound(tx_hash.to_string()))?;
        if ev.asset_id != *expected_asset_id {
            return Err(FuseVaultError::ChainUnavailable("calldata asset mismatch".into()));
        }
        Ok(TransactionDetails { cid: ev.cid.clone(), tx_sender: ev.sender.clone() })
    }

    async fn recover_from_events(&self, asset_id: &AssetId, owner: &WalletAddress) -> Result<RecoveredCid, FuseVaultError> {
        let events = self.events.lock().unwrap();
        events
            .iter()
            .rev()
            .find(|e| e.asset_id == *asset_id && e.owner == *owner)
            .map(|e| RecoveredCid { cid: e.cid.clone(), tx_hash: e.tx_hash.clone() })
            .ok_or_else(|| FuseVaultError::ChainUnavailable(format!("no IPFSUpdated event for {asset_id}")))
    }

    async fn is_delegate(&self, owner: &WalletAddress, delegate: &WalletAddress) -> Result<bool, FuseVaultError> {
        Ok(self
            .delegates
            .lock()
            .unwrap()
            .contains(&(owner.as_str().to_string(), delegate.as_str().to_string())))
    }

    fn server_wallet_address(&self) -> WalletAddress {
        self.server_address.clone()
    }

    async fn scan_delegate_events(&self, _from_block: u64, _to_block: u64) -> Result<Vec<DelegateStatusChangedEvent>, FuseVaultError> {
        Ok(Vec::new())
    }

    async fn latest_block_number(&self) -> Result<u64, FuseVaultError> {
        Ok(0)
    }
}

impl FakeChainClient {
    fn mark_deleted(&self, owner: &WalletAddress, asset_id: &AssetId) {
        if let Some(a) = self.assets.lock().unwrap().get_mut(&Self::key(owner, asset_id)) {
            a.is_deleted = true;
        }
    }
}

pub fn wallet(tail: &str) -> WalletAddress {
    WalletAddress::parse(&format!("0x{:0>40}", tail)).unwrap()
}
