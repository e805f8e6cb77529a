use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Monotonic per-asset version number (starts at 1).
pub type VersionNumber = u32;

/// On-chain IPFS-counter, distinct from `VersionNumber` (see invariant 3 in §3).
pub type IpfsVersion = u32;

// ── WalletAddress ────────────────────────────────────────────────────────────

/// A 20-byte Ethereum-style address, stored and compared in lowercase hex.
///
/// Owner matching throughout the asset store MUST be case-insensitive; keeping
/// the canonical form always-lowercase makes every comparison a plain `==`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Builds from raw input, lowercasing and requiring the `0x` + 40 hex chars shape.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let s = s.trim();
        if !s.starts_with("0x") && !s.starts_with("0X") {
            return Err(AddressParseError::MissingPrefix);
        }
        let hex_part = &s[2..];
        if hex_part.len() != 40 {
            return Err(AddressParseError::WrongLength(hex_part.len()));
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::NotHex);
        }
        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last 8 lowercase hex characters — used as the API-key `wallet_tag8`.
    pub fn tag8(&self) -> &str {
        &self.0[self.0.len() - 8..]
    }
}

impl FromStr for WalletAddress {
    type Err = AddressParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletAddress({})", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 40 hex characters, got {0}")]
    WrongLength(usize),
    #[error("address contains non-hex characters")]
    NotHex,
}

// ── TxHash ───────────────────────────────────────────────────────────────────

/// A 32-byte chain transaction hash, `0x`-prefixed hex.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let s = s.trim();
        if !s.starts_with("0x") {
            return Err(AddressParseError::MissingPrefix);
        }
        let hex_part = &s[2..];
        if hex_part.len() != 64 {
            return Err(AddressParseError::WrongLength(hex_part.len()));
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::NotHex);
        }
        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}…)", &self.0[..10])
    }
}

// ── Cid ──────────────────────────────────────────────────────────────────────

/// An opaque content identifier returned by the content store. Unlike
/// `WalletAddress`/`TxHash`, CIDs are not fixed-width, so this wraps a plain
/// `String` rather than a byte array.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cid(String);

impl Cid {
    pub fn new(s: impl Into<String>) -> Result<Self, CidParseError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(CidParseError::Empty);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CidParseError {
    #[error("CID must not be empty")]
    Empty,
}

// ── AssetId ──────────────────────────────────────────────────────────────────

/// Opaque, owner-chosen identifier. Unique per owner, not globally.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_lowercases() {
        let a = WalletAddress::parse("0xAAAA000000000000000000000000000000bBbB").unwrap();
        assert_eq!(a.as_str(), "0xaaaa000000000000000000000000000000bbbb");
    }

    #[test]
    fn address_tag8_is_last_eight_chars() {
        let a = WalletAddress::parse("0xaaaa0000000000000000000000000000000001").unwrap();
        assert_eq!(a.tag8(), "00000001");
    }

    #[test]
    fn address_rejects_wrong_length() {
        assert!(WalletAddress::parse("0xabc").is_err());
    }

    #[test]
    fn cid_rejects_empty() {
        assert!(Cid::new("").is_err());
        assert!(Cid::new("   ").is_err());
    }
}
