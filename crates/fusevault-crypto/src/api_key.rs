//! API-key format, HMAC signing, and constant-time validation.
//!
//! External form: `fv.v1.{wallet_tag8}.{nonce_b64url}.{sig_b64url}` where
//! `sig` is the first 240 bits of HMAC-SHA256 over
//! `"fv.v1.{wallet_tag}.{nonce_b64url}"` with a server secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use fusevault_core::constants::{API_KEY_NONCE_BYTES, API_KEY_SIGNATURE_BYTES, API_KEY_WALLET_TAG_LEN};

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "fv.v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiKeyFormatError {
    #[error("expected 5 dot-separated parts, got {0}")]
    WrongPartCount(usize),
    #[error("unknown prefix, expected fv.v1")]
    BadPrefix,
    #[error("wallet tag must be {expected} lowercase hex characters")]
    BadWalletTag { expected: usize },
    #[error("nonce is not valid base64url")]
    BadNonce,
    #[error("signature is not valid base64url")]
    BadSignature,
}

/// The parsed, structurally-valid (but not yet signature-checked) form of an
/// API key.
#[derive(Debug, Clone)]
pub struct ParsedApiKey {
    pub wallet_tag8: String,
    pub nonce_b64: String,
    pub sig_b64: String,
    pub signature: Vec<u8>,
}

/// Step 2 of the validation pipeline (§4.7): structural validation against
/// the five-part grammar. Does not touch the HMAC secret or any store.
pub fn parse_api_key(key: &str) -> Result<ParsedApiKey, ApiKeyFormatError> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 5 {
        return Err(ApiKeyFormatError::WrongPartCount(parts.len()));
    }
    if parts[0] != "fv" || parts[1] != "v1" {
        return Err(ApiKeyFormatError::BadPrefix);
    }
    let wallet_tag8 = parts[2].to_string();
    if wallet_tag8.len() != API_KEY_WALLET_TAG_LEN
        || !wallet_tag8.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(ApiKeyFormatError::BadWalletTag {
            expected: API_KEY_WALLET_TAG_LEN,
        });
    }
    let nonce_b64 = parts[3].to_string();
    if URL_SAFE_NO_PAD.decode(&nonce_b64).is_err() {
        return Err(ApiKeyFormatError::BadNonce);
    }
    let sig_b64 = parts[4].to_string();
    let signature = URL_SAFE_NO_PAD
        .decode(&sig_b64)
        .map_err(|_| ApiKeyFormatError::BadSignature)?;

    Ok(ParsedApiKey {
        wallet_tag8,
        nonce_b64,
        sig_b64,
        signature,
    })
}

/// The exact string the HMAC is computed over: `"fv.v1.{wallet_tag}.{nonce_b64url}"`.
fn signing_message(wallet_tag8: &str, nonce_b64: &str) -> String {
    format!("{PREFIX}.{wallet_tag8}.{nonce_b64}")
}

fn hmac_tag(secret: &[u8], message: &str) -> [u8; API_KEY_SIGNATURE_BYTES] {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    let full = mac.finalize().into_bytes();
    let mut truncated = [0u8; API_KEY_SIGNATURE_BYTES];
    truncated.copy_from_slice(&full[..API_KEY_SIGNATURE_BYTES]);
    truncated
}

/// Generates a fresh API key for `wallet_tag8` (the owner's lowercase last-8
/// hex characters), signing with `secret`. Returns the full external string
/// form; this is shown to the caller exactly once.
pub fn generate_api_key(wallet_tag8: &str, secret: &[u8]) -> String {
    let mut nonce = [0u8; API_KEY_NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce_b64 = URL_SAFE_NO_PAD.encode(nonce);
    let message = signing_message(wallet_tag8, &nonce_b64);
    let sig = hmac_tag(secret, &message);
    let sig_b64 = URL_SAFE_NO_PAD.encode(sig);
    format!("{PREFIX}.{wallet_tag8}.{nonce_b64}.{sig_b64}")
}

/// Step 3 of the validation pipeline: constant-time HMAC recomputation and
/// compare. Never short-circuits on byte mismatch.
pub fn verify_signature(parsed: &ParsedApiKey, secret: &[u8]) -> bool {
    let message = signing_message(&parsed.wallet_tag8, &parsed.nonce_b64);
    let expected = hmac_tag(secret, &message);
    if parsed.signature.len() != expected.len() {
        return false;
    }
    expected.ct_eq(parsed.signature.as_slice()).into()
}

/// Step 4's key-hash input: SHA256 over the full string form, exactly as
/// stored server-side.
pub fn key_hash(full_key: &str) -> [u8; 32] {
    crate::hash::sha256(full_key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_round_trips_through_parse_and_verify() {
        let secret = b"server-secret";
        let key = generate_api_key("0000bbbb", secret);
        let parsed = parse_api_key(&key).expect("well-formed key must parse");
        assert_eq!(parsed.wallet_tag8, "0000bbbb");
        assert!(verify_signature(&parsed, secret));
    }

    #[test]
    fn signature_fails_under_wrong_secret() {
        let key = generate_api_key("0000bbbb", b"secret-a");
        let parsed = parse_api_key(&key).unwrap();
        assert!(!verify_signature(&parsed, b"secret-b"));
    }

    #[test]
    fn rejects_wrong_part_count() {
        assert_eq!(parse_api_key("fv.v1.onlythree"), Err(ApiKeyFormatError::WrongPartCount(3)));
    }

    #[test]
    fn rejects_bad_prefix() {
        let err = parse_api_key("xx.v1.0000bbbb.abcd.efgh").unwrap_err();
        assert_eq!(err, ApiKeyFormatError::BadPrefix);
    }

    #[test]
    fn rejects_uppercase_wallet_tag() {
        let err = parse_api_key("fv.v1.0000BBBB.abcd.efgh").unwrap_err();
        assert!(matches!(err, ApiKeyFormatError::BadWalletTag { .. }));
    }

    #[test]
    fn generation_is_deterministic_given_fixed_nonce_and_secret() {
        let secret = b"server-secret";
        let nonce_b64 = URL_SAFE_NO_PAD.encode([7u8; API_KEY_NONCE_BYTES]);
        let message = signing_message("0000bbbb", &nonce_b64);
        let sig1 = hmac_tag(secret, &message);
        let sig2 = hmac_tag(secret, &message);
        assert_eq!(sig1, sig2, "same nonce+secret must yield the same signature");
    }
}
