pub mod auth;

pub use auth::{admin_middleware, token_middleware, AdminCaller, Caller};
