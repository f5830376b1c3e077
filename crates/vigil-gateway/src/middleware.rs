//! Gateway middleware: login throttling and bearer authentication.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use vigil_auth::{AuthService, Claims, TokenService};

use crate::error::ApiError;

/// Keyed rate limiter for login attempts.
///
/// Keys are chosen by unauthenticated clients, so the key map has to be
/// pruned with [`retain_recent`](Self::retain_recent) on a schedule.
pub struct GatewayRateLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
}

impl GatewayRateLimiter {
    /// Create a limiter allowing `per_minute` attempts per key.
    #[must_use]
    pub fn new(per_minute: u32) -> Self {
        Self::with_clock(per_minute, DefaultClock::default())
    }
}

impl<C: Clock> GatewayRateLimiter<C> {
    /// Create a limiter reading time from `clock`.
    #[must_use]
    pub fn with_clock(per_minute: u32, clock: C) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
        }
    }

    /// Check if an attempt for `key` is allowed, consuming one unit.
    #[must_use]
    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Drop keys whose budget has fully replenished and release the space.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    /// Whether no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }
}

impl<C: Clock> std::fmt::Debug for GatewayRateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRateLimiter")
            .field("keys", &self.limiter.len())
            .finish_non_exhaustive()
    }
}

/// Bearer token from the `Authorization` header, if well formed.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(TokenService::extract_from_header)
}

/// Extractor for routes that require a valid access token.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// Verified claims of the access token.
    pub claims: Claims,
}

impl RequireAuth {
    /// Authenticated account ID.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.claims.sub
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or(ApiError::MissingToken)?;
        let claims = auth.authenticate(token).await?;
        Ok(Self { claims })
    }
}
