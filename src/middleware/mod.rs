pub mod auth;
pub mod rate_limit;

pub use auth::{require_bearer_auth, AuthAccount, Claims};
