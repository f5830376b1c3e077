//! # Vigil Auth
//!
//! Authentication core for the Vigil monitoring platform.
//!
//! This crate provides:
//! - Signing configuration materialized from a key/value secret store
//! - JWT access and refresh token issuance and verification
//! - Argon2id password hashing and input validation
//! - An account store with an atomic first-account path
//! - The bootstrap gate and the auth orchestrator built on top of them

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accounts;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod password;
pub mod secrets;
pub mod service;
pub mod token;
pub mod validation;

pub use accounts::{Account, AccountStore, MemoryAccountStore, NewAccount, PublicAccount, SledAccountStore};
pub use bootstrap::BootstrapGate;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SigningConfig, SigningConfigCache};
pub use password::{HashParams, PasswordHasher};
pub use secrets::{MemorySecretStore, SecretStore, SledSecretStore};
pub use service::AuthService;
pub use token::{AccessToken, Claims, IssuedToken, TokenPair, TokenService, TokenType};
pub use validation::PasswordPolicy;

use thiserror::Error;

/// Authentication errors.
///
/// The variants keep the internal cause of a failure. Callers that face
/// untrusted clients are expected to flatten the token and credential
/// variants before responding.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signing configuration is missing or invalid. No token may be issued.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed input to account creation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An account already exists, so the first-user path is closed.
    #[error("Platform already bootstrapped")]
    AlreadyBootstrapped,

    /// Login failed. Deliberately carries no reason.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Bad signature, malformed structure, wrong issuer or algorithm.
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// Signature valid, but the token is past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// A token of one type was presented where the other is required.
    #[error("Token type mismatch: expected {expected}, got {actual}")]
    TokenTypeMismatch {
        /// Type the caller required.
        expected: TokenType,
        /// Type carried by the token.
        actual: TokenType,
    },

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unexpected internal failure (hashing, task join).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this is one of the token verification failures.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenInvalid(_) | Self::TokenExpired | Self::TokenTypeMismatch { .. }
        )
    }

    /// Short stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::AlreadyBootstrapped => "already_bootstrapped",
            Self::InvalidCredentials => "invalid_credentials",
            Self::TokenInvalid(_) => "token_invalid",
            Self::TokenExpired => "token_expired",
            Self::TokenTypeMismatch { .. } => "token_type_mismatch",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<sled::Error> for AuthError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Blocking task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_classification() {
        assert!(AuthError::TokenExpired.is_token_error());
        assert!(AuthError::TokenInvalid("bad".to_string()).is_token_error());
        assert!(
            AuthError::TokenTypeMismatch {
                expected: TokenType::Access,
                actual: TokenType::Refresh,
            }
            .is_token_error()
        );
        assert!(!AuthError::InvalidCredentials.is_token_error());
        assert!(!AuthError::Configuration("x".to_string()).is_token_error());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(AuthError::AlreadyBootstrapped.kind(), "already_bootstrapped");
        assert_eq!(AuthError::TokenExpired.kind(), "token_expired");
    }
}
