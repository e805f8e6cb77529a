pub mod canonical;
pub mod constants;
pub mod error;
pub mod model;
pub mod types;

pub use constants::*;
pub use error::{ErrorKind, FuseVaultError};
pub use model::*;
pub use types::*;
