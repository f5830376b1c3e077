//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use vigil_auth::AuthError;

/// Error returned by gateway handlers.
///
/// Token failures collapse into one `unauthorized` response, and every
/// server-side failure into one `internal_error` response. The detail goes
/// to the log only.
#[derive(Debug)]
pub enum ApiError {
    /// Failure from the auth core.
    Auth(AuthError),
    /// Request body could not be decoded.
    BadRequest(String),
    /// No credential was presented.
    MissingToken,
    /// Too many login attempts for this email.
    RateLimited,
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code.
    pub code: &'static str,
}

const UNAUTHORIZED: &str = "Unauthorized";
const INTERNAL: &str = "Internal server error";

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Auth(e) => match e {
                AuthError::Validation(message) => {
                    (StatusCode::BAD_REQUEST, "validation_error", message)
                }
                AuthError::AlreadyBootstrapped => {
                    (StatusCode::CONFLICT, "already_bootstrapped", e.to_string())
                }
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "invalid_credentials", e.to_string())
                }
                AuthError::TokenInvalid(_)
                | AuthError::TokenExpired
                | AuthError::TokenTypeMismatch { .. } => {
                    tracing::debug!(kind = e.kind(), error = %e, "Token rejected");
                    (StatusCode::UNAUTHORIZED, "unauthorized", UNAUTHORIZED.to_string())
                }
                AuthError::Configuration(_) => {
                    tracing::error!(error = %e, "Signing configuration unusable; no tokens can be issued");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL.to_string())
                }
                AuthError::Storage(_) | AuthError::Internal(_) => {
                    tracing::error!(kind = e.kind(), error = %e, "Request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL.to_string())
                }
            },
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "validation_error", message),
            Self::MissingToken => (StatusCode::UNAUTHORIZED, "unauthorized", UNAUTHORIZED.to_string()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many login attempts".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = self.parts();
        (status, Json(ErrorBody { error, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_auth::TokenType;

    fn parts(e: impl Into<ApiError>) -> (StatusCode, &'static str, String) {
        e.into().parts()
    }

    #[test]
    fn test_token_errors_flatten() {
        let flattened = [
            parts(AuthError::TokenInvalid("bad signature".to_string())),
            parts(AuthError::TokenExpired),
            parts(AuthError::TokenTypeMismatch {
                expected: TokenType::Refresh,
                actual: TokenType::Access,
            }),
            parts(ApiError::MissingToken),
        ];
        for response in flattened {
            assert_eq!(
                response,
                (StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized".to_string())
            );
        }
    }

    #[test]
    fn test_server_errors_hide_detail() {
        for e in [
            AuthError::Configuration("jwt_secret missing".to_string()),
            AuthError::Storage("disk on fire".to_string()),
            AuthError::Internal("join".to_string()),
        ] {
            let (status, code, message) = parts(e);
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(code, "internal_error");
            assert_eq!(message, "Internal server error");
        }
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(parts(AuthError::AlreadyBootstrapped).0, StatusCode::CONFLICT);
        assert_eq!(parts(AuthError::InvalidCredentials).1, "invalid_credentials");
        assert_eq!(
            parts(AuthError::Validation("email is required".to_string())),
            (StatusCode::BAD_REQUEST, "validation_error", "email is required".to_string())
        );
        assert_eq!(parts(ApiError::RateLimited).0, StatusCode::TOO_MANY_REQUESTS);
    }
}
