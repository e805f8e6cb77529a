use sha2::{Digest, Sha256};

/// SHA256 of arbitrary bytes → 32-byte array. Used for API-key storage
/// hashing (`key_hash = SHA256(entire_string_form)`).
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
