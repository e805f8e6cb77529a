//! Canonical JSON encoding.
//!
//! The CID of an asset version is defined entirely by the canonical byte
//! encoding of `{asset_id, owner_address, critical_metadata}`: UTF-8, object
//! keys sorted lexicographically, no whitespace between tokens, no trailing
//! newline, numbers in minimal decimal form. Both the content-store client
//! and the verifier call this module so they can never disagree about what
//! bytes get hashed.

use serde_json::{Map, Value};

use crate::types::{AssetId, WalletAddress};

/// Builds the canonical triple hashed for an asset version's CID.
pub fn canonical_triple(asset_id: &AssetId, owner: &WalletAddress, critical: &Value) -> Value {
    let mut obj = Map::new();
    obj.insert("asset_id".into(), Value::String(asset_id.as_str().to_string()));
    obj.insert("owner_address".into(), Value::String(owner.as_str().to_string()));
    obj.insert("critical_metadata".into(), critical.clone());
    Value::Object(obj)
}

/// Serializes `value` to its canonical byte form.
///
/// `serde_json::Map` is backed by a `BTreeMap` (the `preserve_order` feature
/// is not enabled anywhere in this workspace), so `serde_json::to_vec`
/// already emits object keys in sorted order with no extraneous whitespace;
/// this function exists as the single named seam every caller goes through,
/// so the encoding rule can never drift between call sites.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("Value serialization is infallible")
}

/// Convenience: canonical bytes of the asset-version triple directly.
pub fn canonical_payload_bytes(asset_id: &AssetId, owner: &WalletAddress, critical: &Value) -> Vec<u8> {
    canonical_bytes(&canonical_triple(asset_id, owner, critical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_is_sorted_regardless_of_insertion_order() {
        let a = AssetId::new("doc-1");
        let owner = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        let critical = json!({"zeta": 1, "alpha": 2});
        let bytes = canonical_payload_bytes(&a, &owner, &critical);
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.find("asset_id").unwrap() < s.find("critical_metadata").unwrap());
        assert!(s.find("alpha").unwrap() < s.find("zeta").unwrap());
    }

    #[test]
    fn no_whitespace_in_output() {
        let a = AssetId::new("doc-1");
        let owner = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        let critical = json!({"title": "A"});
        let bytes = canonical_payload_bytes(&a, &owner, &critical);
        let s = String::from_utf8(bytes).unwrap();
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn same_logical_payload_is_byte_identical_across_calls() {
        let a = AssetId::new("doc-1");
        let owner = WalletAddress::parse("0xaaaa000000000000000000000000000000bbbb").unwrap();
        let critical = json!({"title": "A", "count": 3});
        let first = canonical_payload_bytes(&a, &owner, &critical);
        let second = canonical_payload_bytes(&a, &owner, &critical);
        assert_eq!(first, second);
    }
}
