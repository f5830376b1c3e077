//! Signing configuration.
//!
//! Signing parameters are read from a [`SecretStore`] and validated as a
//! whole. There are no fallbacks here: a missing or unparseable value means
//! no token can be issued.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use super::AuthError;
use super::secrets::SecretStore;

/// Secret store keys for the signing parameters.
pub mod keys {
    /// Shared HMAC secret.
    pub const SECRET: &str = "jwt_secret";
    /// Issuer written into and required from every token.
    pub const ISSUER: &str = "jwt_issuer";
    /// Signing algorithm identifier, e.g. `HS256`.
    pub const ALGORITHM: &str = "jwt_algorithm";
    /// Access token lifetime, e.g. `5m`.
    pub const ACCESS_EXPIRY: &str = "jwt_access_expiry";
    /// Refresh token lifetime, e.g. `1y`.
    pub const REFRESH_EXPIRY: &str = "jwt_refresh_expiry";

    /// All keys, in display order.
    pub const ALL: [&str; 5] = [SECRET, ISSUER, ALGORITHM, ACCESS_EXPIRY, REFRESH_EXPIRY];
}

/// Longest accepted token lifetime: 100 years.
pub const MAX_LIFETIME: Duration = Duration::from_secs(100 * 31_557_600);

/// Secrets shorter than this are accepted but logged as weak.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Validated signing parameters.
#[derive(Clone)]
pub struct SigningConfig {
    secret: SecretString,
    issuer: String,
    algorithm: Algorithm,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl SigningConfig {
    /// Build a config from already-parsed parts.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret or issuer is empty, the algorithm
    /// is not HMAC, or a lifetime is shorter than one second or longer than
    /// [`MAX_LIFETIME`].
    pub fn new(
        secret: impl Into<String>,
        issuer: impl Into<String>,
        algorithm: Algorithm,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
    ) -> Result<Self, AuthError> {
        let secret = secret.into();
        let issuer = issuer.into();

        if secret.is_empty() {
            return Err(AuthError::Configuration(format!("{} is empty", keys::SECRET)));
        }
        if issuer.trim().is_empty() {
            return Err(AuthError::Configuration(format!("{} is empty", keys::ISSUER)));
        }
        if !is_hmac(algorithm) {
            return Err(AuthError::Configuration(format!(
                "{} must be an HMAC algorithm (HS256, HS384, HS512), got {algorithm:?}",
                keys::ALGORITHM
            )));
        }
        for (key, lifetime) in [
            (keys::ACCESS_EXPIRY, access_lifetime),
            (keys::REFRESH_EXPIRY, refresh_lifetime),
        ] {
            if lifetime < Duration::from_secs(1) {
                return Err(AuthError::Configuration(format!(
                    "{key} must be at least one second"
                )));
            }
            if lifetime > MAX_LIFETIME {
                return Err(AuthError::Configuration(format!(
                    "{key} must not exceed 100 years"
                )));
            }
        }

        if secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                length = secret.len(),
                recommended = RECOMMENDED_SECRET_LEN,
                "Signing secret is shorter than recommended"
            );
        }

        Ok(Self {
            secret: SecretString::from(secret),
            issuer,
            algorithm,
            access_lifetime,
            refresh_lifetime,
        })
    }

    /// Materialize and validate the config from a secret store.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if any key is missing, empty or invalid, and
    /// `Storage` if the store cannot be read.
    pub async fn load(store: &dyn SecretStore) -> Result<Self, AuthError> {
        let secret = required(store, keys::SECRET).await?;
        let issuer = required(store, keys::ISSUER).await?;
        let algorithm = required(store, keys::ALGORITHM).await?;
        let access = required(store, keys::ACCESS_EXPIRY).await?;
        let refresh = required(store, keys::REFRESH_EXPIRY).await?;

        let algorithm = parse_algorithm(&algorithm)?;
        let access_lifetime = parse_lifetime(&access)
            .map_err(|e| AuthError::Configuration(format!("{}: {e}", keys::ACCESS_EXPIRY)))?;
        let refresh_lifetime = parse_lifetime(&refresh)
            .map_err(|e| AuthError::Configuration(format!("{}: {e}", keys::REFRESH_EXPIRY)))?;

        Self::new(secret, issuer, algorithm, access_lifetime, refresh_lifetime)
    }

    /// The shared secret. Expose only to build signing keys.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }

    /// Issuer string.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signing algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_lifetime(&self) -> Duration {
        self.refresh_lifetime
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish()
    }
}

async fn required(store: &dyn SecretStore, key: &str) -> Result<String, AuthError> {
    match store.get(key).await? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(AuthError::Configuration(format!("{key} is empty"))),
        None => Err(AuthError::Configuration(format!("{key} is not set"))),
    }
}

/// Whether `algorithm` is one of the shared-secret algorithms.
#[must_use]
pub const fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parse an algorithm identifier such as `HS256`.
///
/// # Errors
///
/// Returns `Configuration` for unknown identifiers. Non-HMAC algorithms are
/// rejected later by [`SigningConfig::new`].
pub fn parse_algorithm(value: &str) -> Result<Algorithm, AuthError> {
    Algorithm::from_str(value.trim())
        .map_err(|_| AuthError::Configuration(format!("Unknown algorithm: {value}")))
}

/// Parse a lifetime string.
///
/// Accepts a bare integer (seconds) or a number followed by a unit:
/// `ms`, `s`, `m`, `h`, `d`, `w`, `y` and their long forms. Fractions are
/// allowed (`1.5h`). A year is 365.25 days.
///
/// # Errors
///
/// Returns a description of the problem for empty, negative, unknown-unit,
/// sub-second or longer than [`MAX_LIFETIME`] inputs.
pub fn parse_lifetime(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty lifetime".to_string());
    }

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid lifetime: {value}"))?;

    let unit_secs: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 0.001,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "week" | "weeks" => 604_800.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600.0,
        other => return Err(format!("unknown lifetime unit: {other}")),
    };

    let secs = number * unit_secs;
    if !secs.is_finite() || secs < 1.0 {
        return Err(format!("lifetime must be at least one second: {value}"));
    }
    if secs > MAX_LIFETIME.as_secs_f64() {
        return Err(format!("lifetime must not exceed 100 years: {value}"));
    }
    Duration::try_from_secs_f64(secs.floor()).map_err(|e| format!("invalid lifetime {value}: {e}"))
}

/// Process-wide cache of the validated signing config.
///
/// The config is loaded on first use and kept until [`invalidate`] is called,
/// so a changed secret takes effect only after an explicit reload.
///
/// [`invalidate`]: SigningConfigCache::invalidate
pub struct SigningConfigCache {
    store: Arc<dyn SecretStore>,
    current: RwLock<Option<Arc<SigningConfig>>>,
}

impl SigningConfigCache {
    /// Create an empty cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Return the cached config, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the store does not hold a complete config.
    /// The failure is logged at error level and is not cached.
    pub async fn current(&self) -> Result<Arc<SigningConfig>, AuthError> {
        if let Some(config) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(config));
        }

        let mut slot = self.current.write().await;
        if let Some(config) = slot.as_ref() {
            return Ok(Arc::clone(config));
        }

        match SigningConfig::load(self.store.as_ref()).await {
            Ok(config) => {
                tracing::info!(
                    issuer = %config.issuer(),
                    algorithm = ?config.algorithm(),
                    access_secs = config.access_lifetime().as_secs(),
                    refresh_secs = config.refresh_lifetime().as_secs(),
                    "Signing configuration loaded"
                );
                let config = Arc::new(config);
                *slot = Some(Arc::clone(&config));
                Ok(config)
            }
            Err(e) => {
                tracing::error!(error = %e, "Signing configuration unusable, refusing to issue tokens");
                Err(e)
            }
        }
    }

    /// Drop the cached config so the next use reloads it from the store.
    pub async fn invalidate(&self) {
        self.current.write().await.take();
        tracing::info!("Signing configuration invalidated");
    }
}

impl std::fmt::Debug for SigningConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfigCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    fn complete_store() -> MemorySecretStore {
        MemorySecretStore::from_pairs([
            (keys::SECRET, "0123456789abcdef0123456789abcdef"),
            (keys::ISSUER, "vigil.test"),
            (keys::ALGORITHM, "HS256"),
            (keys::ACCESS_EXPIRY, "5m"),
            (keys::REFRESH_EXPIRY, "1y"),
        ])
    }

    #[test]
    fn test_parse_lifetime() {
        assert_eq!(parse_lifetime("300").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_lifetime("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_lifetime("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_lifetime("2 hours").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_lifetime("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_lifetime("7d").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_lifetime("1w").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_lifetime("1y").unwrap(), Duration::from_secs(31_557_600));
        assert_eq!(parse_lifetime("1500ms").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_lifetime_rejects_garbage() {
        assert!(parse_lifetime("").is_err());
        assert!(parse_lifetime("abc").is_err());
        assert!(parse_lifetime("5 fortnights").is_err());
        assert!(parse_lifetime("-5m").is_err());
        assert!(parse_lifetime("0").is_err());
        assert!(parse_lifetime("500ms").is_err());
        assert!(parse_lifetime("300000y").is_err());
        assert!(parse_lifetime("1e400").is_err());
    }

    #[test]
    fn test_lifetime_upper_bound() {
        assert_eq!(parse_lifetime("100y").unwrap(), MAX_LIFETIME);
        assert!(parse_lifetime("101y").is_err());

        let build = |refresh| {
            SigningConfig::new(
                "0123456789abcdef0123456789abcdef",
                "vigil.test",
                Algorithm::HS256,
                Duration::from_secs(60),
                refresh,
            )
        };
        assert!(build(MAX_LIFETIME).is_ok());
        assert!(matches!(
            build(MAX_LIFETIME + Duration::from_secs(1)),
            Err(AuthError::Configuration(_))
        ));
        assert!(matches!(
            build(Duration::from_secs(u64::MAX)),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_lifetime_fails_to_load() {
        let store = Arc::new(complete_store());
        store.set(keys::REFRESH_EXPIRY, "300000y").await;
        let cache = SigningConfigCache::new(store);
        assert!(matches!(
            cache.current().await,
            Err(AuthError::Configuration(ref msg)) if msg.contains(keys::REFRESH_EXPIRY)
        ));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("HS256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm(" HS512 ").unwrap(), Algorithm::HS512);
        assert!(parse_algorithm("none").is_err());
    }

    #[tokio::test]
    async fn test_load_complete_config() {
        let store = complete_store();
        let config = SigningConfig::load(&store).await.unwrap();
        assert_eq!(config.issuer(), "vigil.test");
        assert_eq!(config.algorithm(), Algorithm::HS256);
        assert_eq!(config.access_lifetime(), Duration::from_secs(300));
        assert_eq!(config.refresh_lifetime(), Duration::from_secs(31_557_600));
    }

    #[tokio::test]
    async fn test_every_key_is_required() {
        for key in keys::ALL {
            let store = complete_store();
            store.remove(key).await;
            let err = SigningConfig::load(&store).await.unwrap_err();
            assert!(matches!(err, AuthError::Configuration(ref msg) if msg.contains(key)));

            let store = complete_store();
            store.set(key, "  ").await;
            let err = SigningConfig::load(&store).await.unwrap_err();
            assert!(matches!(err, AuthError::Configuration(_)));
        }
    }

    #[tokio::test]
    async fn test_rejects_asymmetric_algorithm() {
        let store = complete_store();
        store.set(keys::ALGORITHM, "RS256").await;
        let err = SigningConfig::load(&store).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = SigningConfig::new(
            "super-secret-value",
            "vigil.test",
            Algorithm::HS256,
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
        .unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-value"));
    }

    #[tokio::test]
    async fn test_cache_reloads_only_after_invalidate() {
        let store = Arc::new(complete_store());
        let cache = SigningConfigCache::new(store.clone());

        let first = cache.current().await.unwrap();
        store.set(keys::ISSUER, "rotated.test").await;

        let cached = cache.current().await.unwrap();
        assert!(Arc::ptr_eq(&first, &cached));
        assert_eq!(cached.issuer(), "vigil.test");

        cache.invalidate().await;
        assert_eq!(cache.current().await.unwrap().issuer(), "rotated.test");
    }

    #[tokio::test]
    async fn test_cache_does_not_remember_failures() {
        let store = Arc::new(MemorySecretStore::new());
        let cache = SigningConfigCache::new(store.clone());
        assert!(matches!(cache.current().await, Err(AuthError::Configuration(_))));

        for (key, value) in [
            (keys::SECRET, "0123456789abcdef0123456789abcdef"),
            (keys::ISSUER, "vigil.test"),
            (keys::ALGORITHM, "HS384"),
            (keys::ACCESS_EXPIRY, "15m"),
            (keys::REFRESH_EXPIRY, "30d"),
        ] {
            store.set(key, value).await;
        }
        assert_eq!(cache.current().await.unwrap().algorithm(), Algorithm::HS384);
    }
}
