pub mod abi;
pub mod client;
pub mod nonce;
pub mod types;

pub use client::{ChainClient, EthersChainClient};
pub use types::*;
