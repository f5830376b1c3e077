//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRef, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use vigil_auth::{
    AccessToken, AuthService, PasswordHasher, PublicAccount, SigningConfigCache,
    SledAccountStore, SledSecretStore, TokenPair, TokenService, validation::normalize_email,
};

use crate::GatewayError;
use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::middleware::{GatewayRateLimiter, RequireAuth, bearer_token};

/// State shared across handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Auth orchestrator.
    pub auth: Arc<AuthService>,
    /// Login attempts per normalized email.
    pub login_limiter: Arc<GatewayRateLimiter>,
}

impl FromRef<GatewayState> for Arc<AuthService> {
    fn from_ref(state: &GatewayState) -> Self {
        Arc::clone(&state.auth)
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

impl Gateway {
    /// Open the auth database under the configured data directory and
    /// assemble the auth core on top of it.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or the database cannot be
    /// opened.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.data_dir.join("auth");
        let db = sled::open(&db_path).map_err(|e| {
            GatewayError::Server(format!("Failed to open {}: {e}", db_path.display()))
        })?;

        let accounts = Arc::new(SledAccountStore::with_db(&db)?);
        let secrets = Arc::new(SledSecretStore::with_db(&db)?);
        let tokens = TokenService::new(Arc::new(SigningConfigCache::new(secrets)));
        let hasher = PasswordHasher::new(config.argon2)?;

        let auth = AuthService::new(accounts, tokens, hasher, config.password_policy.clone());
        let state = GatewayState {
            auth: Arc::new(auth),
            login_limiter: Arc::new(GatewayRateLimiter::new(config.login_attempts_per_minute)),
        };

        Ok(Self { config, state })
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Run the gateway server until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(self) -> Result<(), GatewayError> {
        // Serve anyway: check-users and bootstrap do not need the signing
        // config, and login keeps failing loudly until it is fixed.
        if let Err(e) = self.state.auth.tokens().config().current().await {
            tracing::error!(error = %e, "Signing configuration incomplete; login and refresh will fail");
        }

        match self.state.auth.check_has_user().await {
            Ok(false) => tracing::info!("No accounts yet; the first one can be created via POST /v1/auth/user"),
            Ok(true) => {}
            Err(e) => tracing::warn!(error = %e, "Could not read account store"),
        }

        let pruner = spawn_limiter_pruner(Arc::clone(&self.state.login_limiter));
        let app = router(self.state, &self.config.cors_origins);

        let addr: SocketAddr = self
            .config
            .listen_address()
            .parse()
            .map_err(|e| GatewayError::Server(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Gateway listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Gracefully shutting down");
            })
            .await?;

        pruner.abort();
        Ok(())
    }
}

/// How often stale login limiter keys are dropped.
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

fn spawn_limiter_pruner(limiter: Arc<GatewayRateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let before = limiter.len();
            limiter.retain_recent();
            tracing::debug!(before, after = limiter.len(), "Pruned login limiter keys");
        }
    })
}

/// Build the HTTP router.
///
/// CORS is only enabled for the listed origins; an empty list adds no CORS
/// layer at all.
pub fn router(state: GatewayState, cors_origins: &[String]) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/auth/check-users", get(check_users_handler))
        .route("/v1/auth/user", post(create_first_user_handler))
        .route("/v1/auth", post(login_handler))
        .route("/v1/auth/session", get(session_handler))
        .route("/v1/refresh", post(refresh_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return app;
    }

    app.layer(
        CorsLayer::new()
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(AllowOrigin::list(origins)),
    )
}

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HasUserResponse {
    has_user: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    account_id: String,
    expires_at: Option<DateTime<Utc>>,
}

fn bad_request(rejection: &JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn check_users_handler(
    State(auth): State<Arc<AuthService>>,
) -> Result<Json<HasUserResponse>, ApiError> {
    let has_user = auth.check_has_user().await?;
    Ok(Json(HasUserResponse { has_user }))
}

async fn create_first_user_handler(
    State(auth): State<Arc<AuthService>>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|e| bad_request(&e))?;
    let account: PublicAccount = auth
        .create_first_user(&request.email, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn login_handler(
    State(state): State<GatewayState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(request) = body.map_err(|e| bad_request(&e))?;

    let key = normalize_email(&request.email);
    if !state.login_limiter.check(&key) {
        tracing::warn!(email = %key, "Login rate limit exceeded");
        return Err(ApiError::RateLimited);
    }

    let pair = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(pair))
}

/// Token from the JSON body wins over the `Authorization` header.
async fn refresh_handler(
    State(auth): State<Arc<AuthService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AccessToken>, ApiError> {
    let request: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    let token = request
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or(ApiError::MissingToken)?;

    let access = auth.refresh(token).await?;
    Ok(Json(access))
}

async fn session_handler(auth: RequireAuth) -> Json<SessionResponse> {
    Json(SessionResponse {
        account_id: auth.account_id().to_string(),
        expires_at: DateTime::from_timestamp(auth.claims.exp, 0),
    })
}
