//! Argon2id password hashing.

use std::sync::{Arc, OnceLock};

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashParams {
    /// Cheapest parameters Argon2 accepts. Only for tests.
    #[must_use]
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

/// Hashes and verifies passwords. Cheap to clone.
///
/// Both operations are CPU and memory heavy, so the async variants run them
/// on the blocking thread pool.
#[derive(Clone)]
pub struct PasswordHasher {
    inner: Arc<Inner>,
}

struct Inner {
    argon2: Argon2<'static>,
    /// Hash of a random password, verified against when an account is
    /// missing so that lookups cost the same either way.
    dummy_hash: OnceLock<String>,
}

impl PasswordHasher {
    /// Create a hasher with the given cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if Argon2 rejects the parameters.
    pub fn new(params: HashParams) -> Result<Self, AuthError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| AuthError::Configuration(format!("Invalid Argon2 parameters: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
                dummy_hash: OnceLock::new(),
            }),
        })
    }

    /// Hash a password into a PHC string.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.inner
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {e}")))
    }

    /// Verify a password against a stored PHC string.
    ///
    /// Parameters embedded in the hash take precedence, so hashes produced
    /// with other costs (or Argon2d/Argon2i) still verify.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` on mismatch and `Internal` if the stored
    /// hash cannot be parsed.
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Internal(format!("Invalid stored hash: {e}")))?;

        self.inner
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Burn the same work as a real verification, always failing.
    pub fn verify_dummy(&self, password: &str) {
        let hash = self.inner.dummy_hash.get_or_init(|| {
            let filler = hex::encode(rand::random::<[u8; 16]>());
            self.hash(&filler).unwrap_or_default()
        });
        if !hash.is_empty() {
            let _ = self.verify(password, hash);
        }
    }

    /// [`hash`](Self::hash) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if hashing fails or the task panics.
    pub async fn hash_async(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`verify`](Self::verify).
    pub async fn verify_async(&self, password: String, hash: String) -> Result<(), AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash)).await?
    }

    /// [`verify_dummy`](Self::verify_dummy) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the task panics.
    pub async fn verify_dummy_async(&self, password: String) -> Result<(), AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", self.inner.argon2.params())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::PasswordHasher as _;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(HashParams::insecure_fast()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("password123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("password123", &hash).is_ok());
        assert!(matches!(
            hasher.verify("wrongpassword", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_verifies_hash_with_other_variant_and_costs() {
        let legacy = Argon2::new(
            Algorithm::Argon2d,
            Version::V0x13,
            Params::new(1024, 1, 1, None).unwrap(),
        );
        let salt = SaltString::generate(&mut OsRng);
        let hash = legacy
            .hash_password(b"right password", &salt)
            .unwrap()
            .to_string();
        assert!(hash.starts_with("$argon2d$v=19$m=1024,t=1,p=1$"));

        let hasher = hasher();
        assert!(hasher.verify("right password", &hash).is_ok());
        assert!(hasher.verify("wrong password", &hash).is_err());
    }

    #[test]
    fn test_malformed_stored_hash() {
        let result = hasher().verify("anything", "not-a-phc-string");
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let params = HashParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        };
        assert!(matches!(
            PasswordHasher::new(params),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_async_variants() {
        let hasher = hasher();
        let hash = hasher.hash_async("secret".to_string()).await.unwrap();
        assert!(hasher.verify_async("secret".to_string(), hash).await.is_ok());
        assert!(hasher.verify_dummy_async("secret".to_string()).await.is_ok());
    }
}
