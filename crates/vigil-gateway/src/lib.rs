//! # Vigil Gateway
//!
//! HTTP surface of the Vigil authentication core.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Gateway configuration.
pub mod config;
/// HTTP error mapping.
pub mod error;
mod middleware;
mod server;

pub use config::{ConfigError, GatewayConfig};
pub use error::ApiError;
pub use middleware::{GatewayRateLimiter, RequireAuth};
pub use server::{Gateway, GatewayState, router};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Auth core could not be assembled.
    #[error("Auth error: {0}")]
    Auth(#[from] vigil_auth::AuthError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
