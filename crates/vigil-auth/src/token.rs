//! JWT token issuance and verification.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::AuthError;
use super::clock::{Clock, SystemClock};
use super::config::{SigningConfig, SigningConfigCache};

/// Token type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token for API calls.
    Access,
    /// Long-lived token used only to obtain new access tokens.
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID).
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Token type (access or refresh).
    pub token_type: TokenType,
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Encoded JWT.
    pub token: String,
    /// Expiration instant.
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiration.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiration.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// Access token.
    pub access_token: String,
    /// Access token expiration.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies signed tokens.
///
/// Signing parameters come from the [`SigningConfigCache`] on every call, so
/// an invalidated cache takes effect immediately. The algorithm used for
/// verification is always the configured one, never the token header's.
pub struct TokenService {
    config: Arc<SigningConfigCache>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a token service reading the wall clock.
    #[must_use]
    pub fn new(config: Arc<SigningConfigCache>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a token service with an explicit time source.
    #[must_use]
    pub fn with_clock(config: Arc<SigningConfigCache>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// The signing config cache backing this service.
    #[must_use]
    pub fn config(&self) -> &Arc<SigningConfigCache> {
        &self.config
    }

    /// Sign a token of `token_type` for `subject`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the signing config is incomplete, and
    /// `Internal` if encoding fails.
    pub async fn issue(&self, subject: &str, token_type: TokenType) -> Result<IssuedToken, AuthError> {
        let config = self.config.current().await?;
        issue_with(&config, self.clock.now(), subject, token_type)
    }

    /// Verify a token and require it to be of `expected` type.
    ///
    /// Checks run in order: signature and structure, issuer, expiry, type.
    ///
    /// # Errors
    ///
    /// - `TokenInvalid` for a bad signature, malformed token, foreign
    ///   algorithm or wrong issuer
    /// - `TokenExpired` when `now >= exp`
    /// - `TokenTypeMismatch` when the type discriminator differs
    /// - `Configuration` if the signing config is incomplete
    pub async fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let config = self.config.current().await?;
        verify_with(&config, self.clock.now(), token, expected)
    }

    /// Extract token from an Authorization header value.
    ///
    /// Expects format: "Bearer <token>"
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

fn issue_with(
    config: &SigningConfig,
    now: DateTime<Utc>,
    subject: &str,
    token_type: TokenType,
) -> Result<IssuedToken, AuthError> {
    let lifetime = match token_type {
        TokenType::Access => config.access_lifetime(),
        TokenType::Refresh => config.refresh_lifetime(),
    };
    let lifetime = chrono::Duration::from_std(lifetime)
        .map_err(|e| AuthError::Configuration(format!("Lifetime out of range: {e}")))?;
    // Claims carry whole seconds, so the window starts on one too.
    let now = now.trunc_subsecs(0);
    let expires_at = now.checked_add_signed(lifetime).ok_or_else(|| {
        AuthError::Configuration(format!("{token_type} token lifetime overflows the calendar"))
    })?;

    let claims = Claims {
        sub: subject.to_string(),
        iss: config.issuer().to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        token_type,
    };

    let token = encode(
        &Header::new(config.algorithm()),
        &claims,
        &EncodingKey::from_secret(config.secret()),
    )
    .map_err(|e| AuthError::Internal(format!("Token encoding failed: {e}")))?;

    Ok(IssuedToken { token, expires_at })
}

fn verify_with(
    config: &SigningConfig,
    now: DateTime<Utc>,
    token: &str,
    expected: TokenType,
) -> Result<Claims, AuthError> {
    // Expiry is checked below against the injected clock, with no leeway.
    let mut validation = Validation::new(config.algorithm());
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["sub", "iss", "exp"]);
    validation.set_issuer(&[config.issuer()]);

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(config.secret()), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidIssuer => AuthError::TokenInvalid("issuer mismatch".to_string()),
            ErrorKind::InvalidSignature => AuthError::TokenInvalid("bad signature".to_string()),
            ErrorKind::InvalidAlgorithm => {
                AuthError::TokenInvalid("unexpected algorithm".to_string())
            }
            _ => AuthError::TokenInvalid(format!("malformed token: {e}")),
        })?
        .claims;

    if now.timestamp() >= claims.exp {
        return Err(AuthError::TokenExpired);
    }

    if claims.token_type != expected {
        return Err(AuthError::TokenTypeMismatch {
            expected,
            actual: claims.token_type,
        });
    }

    Ok(claims)
}
