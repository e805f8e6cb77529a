pub mod api_key_auth;
pub mod dispatch;

pub use api_key_auth::{ApiKeyAuthContext, ApiKeyAuthenticator};
pub use dispatch::{dispatch, AuthContext, AuthMethod};
