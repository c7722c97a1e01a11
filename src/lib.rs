/// Tollgate - login and session authority
///
/// Exchanges third-party identity tokens for first-party sessions: a
/// short-lived signed access token plus a single-use rotating refresh token.
/// Served over a framed TCP session protocol and a small HTTP gateway.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod login;
pub mod rate_limit;
pub mod redact;
pub mod server;
pub mod token;
pub mod wire;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{AuthError, AuthResult};
