pub mod api_key;
pub mod hash;

pub use api_key::{generate_api_key, key_hash, parse_api_key, verify_signature, ApiKeyFormatError, ParsedApiKey};
pub use hash::sha256;
