//! First-user bootstrap gate.
//!
//! The first account can be created exactly once. Two layers enforce it:
//! a process-wide writer section serializing all attempts in this process,
//! and the account store's atomic `create_first`, which also covers
//! multiple processes sharing one store.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::AuthError;
use super::accounts::{AccountStore, NewAccount, PublicAccount};
use super::password::PasswordHasher;
use super::validation::{PasswordPolicy, validate_email};

/// Guards the create-first-account path.
pub struct BootstrapGate {
    accounts: Arc<dyn AccountStore>,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
    writer: Mutex<()>,
}

impl BootstrapGate {
    /// Create a gate in front of `accounts`.
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, hasher: PasswordHasher, policy: PasswordPolicy) -> Self {
        Self {
            accounts,
            hasher,
            policy,
            writer: Mutex::new(()),
        }
    }

    /// Whether any account exists. Never waits on the writer section.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be read.
    pub async fn has_any_account(&self) -> Result<bool, AuthError> {
        self.accounts.exists().await
    }

    /// Create the first account.
    ///
    /// # Errors
    ///
    /// - `Validation` if the email or password is rejected
    /// - `AlreadyBootstrapped` if any account exists at the moment of the
    ///   atomic attempt
    /// - `Storage` / `Internal` on backend or hashing failure
    pub async fn create_first_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<PublicAccount, AuthError> {
        let email = validate_email(email)?;
        self.policy.check(password)?;

        // Skips the hash for callers that are certainly late. Not a
        // decision: only `create_first` below decides.
        if self.accounts.exists().await? {
            return Err(AuthError::AlreadyBootstrapped);
        }

        let password_hash = self.hasher.hash_async(password.to_string()).await?;

        let account = {
            let _writer = self.writer.lock().await;
            self.accounts
                .create_first(NewAccount {
                    email,
                    password_hash,
                })
                .await?
        };

        tracing::info!(
            account_id = %account.id,
            email = %account.email,
            "Initial admin account created via bootstrap"
        );

        Ok(account.to_public())
    }
}

impl std::fmt::Debug for BootstrapGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
