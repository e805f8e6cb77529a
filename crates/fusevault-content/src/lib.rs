pub mod client;

pub use client::{ContentStore, ContentStoreHttp, RetrievedPayload};
