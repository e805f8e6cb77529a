pub mod ctx;
pub mod delegate;
pub mod delete;
pub mod outcome;
pub mod retrieve;
pub mod upload;

pub use ctx::OrchestratorCtx;
pub use delegate::{complete_set_delegate, set_delegate};
pub use delete::{complete_delete, delete, delete_batch, DeleteInput, DeleteResult, DeleteStatus};
pub use outcome::{Outcome, PendingTxHandle};
pub use retrieve::{retrieve_metadata, RetrieveResult, VerificationVerdict};
pub use upload::{complete_upload, upload, upload_batch, UploadInput, UploadResult};
