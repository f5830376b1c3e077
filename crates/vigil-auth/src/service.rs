//! Auth orchestrator: the four public operations.

use std::sync::Arc;

use super::AuthError;
use super::accounts::{AccountStore, PublicAccount};
use super::bootstrap::BootstrapGate;
use super::password::PasswordHasher;
use super::token::{AccessToken, Claims, TokenPair, TokenService, TokenType};
use super::validation::{PasswordPolicy, normalize_email};

/// Composes the account store, bootstrap gate, hasher and token service.
///
/// Login and refresh failures keep their cause in the logs only. Login
/// returns `InvalidCredentials` for every credential failure; refresh keeps
/// the token error kind so the boundary can log it before flattening.
///
/// Tokens are stateless. Disabling or suspending an account blocks new
/// logins, but tokens issued before the change stay valid until they
/// expire, and refresh does not consult the account store.
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    gate: BootstrapGate,
    tokens: TokenService,
    hasher: PasswordHasher,
}

impl AuthService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: TokenService,
        hasher: PasswordHasher,
        policy: PasswordPolicy,
    ) -> Self {
        let gate = BootstrapGate::new(Arc::clone(&accounts), hasher.clone(), policy);
        Self {
            accounts,
            gate,
            tokens,
            hasher,
        }
    }

    /// The token service, for callers that verify tokens directly.
    #[must_use]
    pub const fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Whether the platform has any account yet.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the account store cannot be read.
    pub async fn check_has_user(&self) -> Result<bool, AuthError> {
        self.gate.has_any_account().await
    }

    /// Create the platform's first account.
    ///
    /// # Errors
    ///
    /// See [`BootstrapGate::create_first_account`].
    pub async fn create_first_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<PublicAccount, AuthError> {
        self.gate.create_first_account(email, password).await
    }

    /// Exchange credentials for an access/refresh token pair.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown email, a disabled or suspended
    ///   account, or a wrong password
    /// - `Configuration` if the signing config is incomplete
    /// - `Storage` if the account store cannot be read
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            self.hasher.verify_dummy_async(password.to_string()).await?;
            tracing::debug!(%email, reason = "unknown_email", "Login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        // Verify before looking at the flags so every path pays for one hash.
        match self
            .hasher
            .verify_async(password.to_string(), account.password_hash.clone())
            .await
        {
            Ok(()) => {}
            Err(AuthError::InvalidCredentials) => {
                tracing::debug!(%email, reason = "wrong_password", "Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(account_id = %account.id, error = %e, "Stored password hash unusable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        if !account.enabled {
            tracing::debug!(%email, reason = "disabled", "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        if account.suspended {
            tracing::debug!(%email, reason = "suspended", "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let access = self.tokens.issue(&account.id, TokenType::Access).await?;
        let refresh = self.tokens.issue(&account.id, TokenType::Refresh).await?;

        tracing::info!(account_id = %account.id, "Login succeeded");

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Exchange a refresh token for a new access token. The refresh token
    /// is not rotated.
    ///
    /// # Errors
    ///
    /// - `TokenInvalid` / `TokenExpired` / `TokenTypeMismatch` from
    ///   verification
    /// - `Configuration` if the signing config is incomplete
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let claims = self
            .tokens
            .verify(refresh_token, TokenType::Refresh)
            .await
            .inspect_err(|e| {
                if e.is_token_error() {
                    tracing::debug!(kind = e.kind(), error = %e, "Refresh rejected");
                }
            })?;

        let access = self.tokens.issue(&claims.sub, TokenType::Access).await?;

        Ok(AccessToken {
            access_token: access.token,
            expires_at: access.expires_at,
        })
    }

    /// Verify an access token presented on an API call.
    ///
    /// # Errors
    ///
    /// Same as [`TokenService::verify`].
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        self.tokens.verify(access_token, TokenType::Access).await
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryAccountStore;
    use crate::clock::ManualClock;
    use crate::config::{SigningConfigCache, keys};
    use crate::password::HashParams;
    use crate::secrets::MemorySecretStore;
    use chrono::{DateTime, Utc};

    const PASSWORD: &str = "correct horse battery";

    struct Fixture {
        service: AuthService,
        accounts: Arc<MemoryAccountStore>,
        secrets: Arc<MemorySecretStore>,
        clock: Arc<ManualClock>,
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let accounts = Arc::new(MemoryAccountStore::new());
        let secrets = Arc::new(MemorySecretStore::from_pairs([
            (keys::SECRET, "fixture-secret-fixture-secret-32"),
            (keys::ISSUER, "vigil.test"),
            (keys::ALGORITHM, "HS256"),
            (keys::ACCESS_EXPIRY, "15m"),
            (keys::REFRESH_EXPIRY, "30d"),
        ]));
        let clock = Arc::new(ManualClock::new(start()));
        let tokens = TokenService::with_clock(
            Arc::new(SigningConfigCache::new(secrets.clone())),
            clock.clone(),
        );
        let hasher = PasswordHasher::new(HashParams::insecure_fast()).unwrap();
        let service = AuthService::new(accounts.clone(), tokens, hasher, PasswordPolicy::default());

        Fixture {
            service,
            accounts,
            secrets,
            clock,
        }
    }

    async fn bootstrapped() -> Fixture {
        let fixture = fixture();
        fixture
            .service
            .create_first_user("admin@vigil.dev", PASSWORD)
            .await
            .unwrap();
        fixture
    }

    #[tokio::test]
    async fn test_check_has_user() {
        let fixture = fixture();
        assert!(!fixture.service.check_has_user().await.unwrap());

        let account = fixture
            .service
            .create_first_user("admin@vigil.dev", PASSWORD)
            .await
            .unwrap();
        assert_eq!(account.email, "admin@vigil.dev");
        assert!(fixture.service.check_has_user().await.unwrap());

        assert!(matches!(
            fixture.service.create_first_user("second@vigil.dev", PASSWORD).await,
            Err(AuthError::AlreadyBootstrapped)
        ));
        assert!(fixture.service.check_has_user().await.unwrap());
    }

    #[tokio::test]
    async fn test_login_success() {
        let fixture = bootstrapped().await;

        let pair = fixture.service.login("Admin@Vigil.dev ", PASSWORD).await.unwrap();
        let access = fixture.service.authenticate(&pair.access_token).await.unwrap();
        let account = fixture
            .accounts
            .find_by_email("admin@vigil.dev")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(access.sub, account.id);
        assert_eq!(pair.expires_at - start(), chrono::Duration::minutes(15));
        assert_eq!(pair.refresh_expires_at - start(), chrono::Duration::days(30));
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let fixture = bootstrapped().await;

        let unknown = fixture.service.login("nobody@vigil.dev", PASSWORD).await;
        let wrong = fixture.service.login("admin@vigil.dev", "wrong password").await;

        fixture
            .accounts
            .set_flags("admin@vigil.dev", Some(false), None)
            .await
            .unwrap();
        let disabled = fixture.service.login("admin@vigil.dev", PASSWORD).await;

        fixture
            .accounts
            .set_flags("admin@vigil.dev", Some(true), Some(true))
            .await
            .unwrap();
        let suspended = fixture.service.login("admin@vigil.dev", PASSWORD).await;

        let messages: Vec<String> = [unknown, wrong, disabled, suspended]
            .into_iter()
            .map(|result| match result {
                Err(e @ AuthError::InvalidCredentials) => e.to_string(),
                other => panic!("expected InvalidCredentials, got {other:?}"),
            })
            .collect();
        assert!(messages.windows(2).all(|w| w[0] == w[1]));

        fixture
            .accounts
            .set_flags("admin@vigil.dev", None, Some(false))
            .await
            .unwrap();
        assert!(fixture.service.login("admin@vigil.dev", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_issues_access_token() {
        let fixture = bootstrapped().await;
        let pair = fixture.service.login("admin@vigil.dev", PASSWORD).await.unwrap();

        fixture.clock.advance(chrono::Duration::days(1));
        let refreshed = fixture.service.refresh(&pair.refresh_token).await.unwrap();
        let claims = fixture.service.authenticate(&refreshed.access_token).await.unwrap();
        let original = fixture.service.tokens().verify(&pair.refresh_token, TokenType::Refresh).await.unwrap();
        assert_eq!(claims.sub, original.sub);

        // Not rotated: the same refresh token keeps working.
        assert!(fixture.service.refresh(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let fixture = bootstrapped().await;
        let pair = fixture.service.login("admin@vigil.dev", PASSWORD).await.unwrap();

        assert!(matches!(
            fixture.service.refresh(&pair.access_token).await,
            Err(AuthError::TokenTypeMismatch { .. })
        ));
        assert!(matches!(
            fixture.service.authenticate(&pair.refresh_token).await,
            Err(AuthError::TokenTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_after_expiry() {
        let fixture = bootstrapped().await;
        let pair = fixture.service.login("admin@vigil.dev", PASSWORD).await.unwrap();

        fixture.clock.advance(chrono::Duration::days(30));
        assert!(matches!(
            fixture.service.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_secret_change_invalidates_refresh_token() {
        let fixture = bootstrapped().await;
        let pair = fixture.service.login("admin@vigil.dev", PASSWORD).await.unwrap();

        fixture
            .secrets
            .set(keys::SECRET, "rotated-secret-rotated-secret-32")
            .await;
        fixture.service.tokens().config().invalidate().await;

        assert!(matches!(
            fixture.service.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_suspension_does_not_revoke_issued_tokens() {
        let fixture = bootstrapped().await;
        let pair = fixture.service.login("admin@vigil.dev", PASSWORD).await.unwrap();

        fixture
            .accounts
            .set_flags("admin@vigil.dev", None, Some(true))
            .await
            .unwrap();

        assert!(fixture.service.authenticate(&pair.access_token).await.is_ok());
        assert!(fixture.service.refresh(&pair.refresh_token).await.is_ok());
        assert!(matches!(
            fixture.service.login("admin@vigil.dev", PASSWORD).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_missing_config_blocks_login() {
        let fixture = bootstrapped().await;
        fixture.secrets.remove(keys::ALGORITHM).await;

        assert!(matches!(
            fixture.service.login("admin@vigil.dev", PASSWORD).await,
            Err(AuthError::Configuration(_))
        ));
    }
}
