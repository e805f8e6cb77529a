use ethers::contract::abigen;

// Human-readable ABI for the subset of the FuseVault registry contract this
// workspace consumes (§4.2, §6). The contract itself is out of scope — we
// only need a typed interface to call it.
abigen!(
    FuseVaultRegistry,
    r#"[
        function storeCIDDigest(string assetId, string cid) external
        function updateIPFS(string assetId, string cid) external
        function updateIPFSFor(address owner, string assetId, string cid) external
        function deleteAsset(string assetId) external
        function deleteAssetFor(address owner, string assetId) external
        function batchDeleteAssets(string[] assetIds) external
        function batchDeleteAssetsFor(address owner, string[] assetIds) external
        function setDelegate(address delegate, bool status) external
        function delegates(address owner, address delegate) external view returns (bool)
        function getIPFSInfo(address owner, string assetId) external view returns (string cid, uint256 version, bool isDeleted)
        function verifyCID(address owner, string assetId, string cid, uint256 claimedVersion) external view returns (bool isValid, uint256 actualVersion, bool isDeleted, string message)
        event DelegateStatusChanged(address indexed owner, address indexed delegate, bool status)
        event IPFSUpdated(address indexed owner, string assetId, string cid)
    ]"#
);
