//! Account model and storage.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use tokio::sync::Mutex;

use super::AuthError;

/// Tree holding `id -> Account` JSON records.
const ACCOUNTS_TREE: &str = "accounts";
/// Tree holding `email -> id` index entries.
const EMAIL_INDEX_TREE: &str = "account_emails";
/// Tree holding store-wide markers.
const META_TREE: &str = "meta";
/// Set once by the first account write, never removed.
const INITIALIZED_KEY: &[u8] = b"initialized";

/// Stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID.
    pub id: String,
    /// Normalized email, unique across the store.
    pub email: String,
    /// Argon2 PHC string. Never leaves the server.
    pub password_hash: String,
    /// Cleared by an administrator to block login.
    pub enabled: bool,
    /// Set by an administrator to block login.
    pub suspended: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account may log in.
    #[must_use]
    pub const fn can_login(&self) -> bool {
        self.enabled && !self.suspended
    }

    /// Hash-free view for API responses.
    #[must_use]
    pub fn to_public(&self) -> PublicAccount {
        PublicAccount {
            id: self.id.clone(),
            email: self.email.clone(),
            enabled: self.enabled,
            suspended: self.suspended,
            created_at: self.created_at,
        }
    }
}

/// Public account representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    /// Unique account ID.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Whether enabled.
    pub enabled: bool,
    /// Whether suspended.
    pub suspended: bool,
    /// When created.
    pub created_at: DateTime<Utc>,
}

/// Input to account creation. The email must already be normalized.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Normalized email.
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

impl NewAccount {
    fn into_account(self) -> Account {
        Account {
            id: format!("acct_{}", new_id()),
            email: self.email,
            password_hash: self.password_hash,
            enabled: true,
            suspended: false,
            created_at: Utc::now(),
        }
    }
}

/// Persistence for accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Whether any account exists.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend cannot be read.
    async fn exists(&self) -> Result<bool, AuthError>;

    /// Look up an account by normalized email.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend cannot be read.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;

    /// Create an account only if the store holds none.
    ///
    /// The emptiness check and the insert must be one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyBootstrapped` if any account exists at the moment of
    /// the attempt, `Storage` on backend failure.
    async fn create_first(&self, account: NewAccount) -> Result<Account, AuthError>;
}

/// In-memory account store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
}

impl MemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn count(&self) -> usize {
        self.accounts.lock().await.len()
    }

    /// Change an account's flags, returning the updated account.
    pub async fn set_flags(
        &self,
        email: &str,
        enabled: Option<bool>,
        suspended: Option<bool>,
    ) -> Option<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.iter_mut().find(|a| a.email == email)?;
        if let Some(enabled) = enabled {
            account.enabled = enabled;
        }
        if let Some(suspended) = suspended {
            account.suspended = suspended;
        }
        Some(account.clone())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn exists(&self) -> Result<bool, AuthError> {
        Ok(!self.accounts.lock().await.is_empty())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        Ok(self
            .accounts
            .lock()
            .await
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn create_first(&self, account: NewAccount) -> Result<Account, AuthError> {
        let mut accounts = self.accounts.lock().await;
        if !accounts.is_empty() {
            return Err(AuthError::AlreadyBootstrapped);
        }
        let account = account.into_account();
        accounts.push(account.clone());
        Ok(account)
    }
}

/// Account store backed by sled.
///
/// Every account write happens in a transaction that also sets the
/// `initialized` marker, and the first-account path aborts when the marker
/// is present, so concurrent bootstrap attempts serialize on it.
#[derive(Clone)]
pub struct SledAccountStore {
    accounts: sled::Tree,
    emails: sled::Tree,
    meta: sled::Tree,
}

impl SledAccountStore {
    /// Open or create an account store under `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let db = sled::open(path.join("auth"))
            .map_err(|e| AuthError::Storage(format!("Failed to open auth database: {e}")))?;
        Self::with_db(&db)
    }

    /// Open the account trees inside an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if a tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, AuthError> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| AuthError::Storage(format!("Failed to open {name} tree: {e}")))
        };
        Ok(Self {
            accounts: open(ACCOUNTS_TREE)?,
            emails: open(EMAIL_INDEX_TREE)?,
            meta: open(META_TREE)?,
        })
    }

    fn exists_sync(&self) -> Result<bool, AuthError> {
        Ok(self.meta.contains_key(INITIALIZED_KEY)?)
    }

    fn get_sync(&self, id: &[u8]) -> Result<Option<Account>, AuthError> {
        self.accounts
            .get(id)?
            .map(|value| {
                serde_json::from_slice(&value)
                    .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))
            })
            .transpose()
    }

    fn find_by_email_sync(&self, email: &str) -> Result<Option<Account>, AuthError> {
        match self.emails.get(email.as_bytes())? {
            Some(id) => self.get_sync(&id),
            None => Ok(None),
        }
    }

    fn create_first_sync(&self, account: &Account) -> Result<(), AuthError> {
        let value = serde_json::to_vec(account)
            .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))?;

        (&self.accounts, &self.emails, &self.meta)
            .transaction(|(accounts, emails, meta)| {
                if meta.get(INITIALIZED_KEY)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        AuthError::AlreadyBootstrapped,
                    ));
                }
                meta.insert(INITIALIZED_KEY, account.id.as_bytes())?;
                accounts.insert(account.id.as_bytes(), value.as_slice())?;
                emails.insert(account.email.as_bytes(), account.id.as_bytes())?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => AuthError::Storage(format!("Insert error: {e}")),
            })?;

        self.accounts
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;
        Ok(())
    }

    /// List all accounts.
    ///
    /// # Errors
    ///
    /// Returns error if iteration or deserialization fails.
    pub fn list(&self) -> Result<Vec<Account>, AuthError> {
        self.accounts
            .iter()
            .values()
            .map(|value| {
                let value = value.map_err(|e| AuthError::Storage(format!("Iter error: {e}")))?;
                serde_json::from_slice(&value)
                    .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))
            })
            .collect()
    }

    /// Change an account's flags. This is an administrative action; the
    /// auth core never calls it.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if no account has this email, `Storage` on
    /// backend failure.
    pub fn set_flags(
        &self,
        email: &str,
        enabled: Option<bool>,
        suspended: Option<bool>,
    ) -> Result<Account, AuthError> {
        let mut account = self
            .find_by_email_sync(email)?
            .ok_or_else(|| AuthError::Validation(format!("No account for {email}")))?;

        if let Some(enabled) = enabled {
            account.enabled = enabled;
        }
        if let Some(suspended) = suspended {
            account.suspended = suspended;
        }

        let value = serde_json::to_vec(&account)
            .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))?;
        self.accounts
            .insert(account.id.as_bytes(), value)
            .map_err(|e| AuthError::Storage(format!("Update error: {e}")))?;
        self.accounts
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;

        Ok(account)
    }
}

#[async_trait]
impl AccountStore for SledAccountStore {
    async fn exists(&self) -> Result<bool, AuthError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.exists_sync()).await?
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        let store = self.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || store.find_by_email_sync(&email)).await?
    }

    async fn create_first(&self, account: NewAccount) -> Result<Account, AuthError> {
        let store = self.clone();
        let account = account.into_account();
        tokio::task::spawn_blocking(move || {
            store.create_first_sync(&account)?;
            Ok(account)
        })
        .await?
    }
}

impl std::fmt::Debug for SledAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledAccountStore")
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}

/// Random 128-bit identifier, hex encoded.
fn new_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password_hash: "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_first_account() {
        let store = MemoryAccountStore::new();
        assert!(!store.exists().await.unwrap());

        let account = store.create_first(new_account("admin@vigil.dev")).await.unwrap();
        assert!(account.id.starts_with("acct_"));
        assert!(account.can_login());
        assert!(store.exists().await.unwrap());

        let again = store.create_first(new_account("other@vigil.dev")).await;
        assert!(matches!(again, Err(AuthError::AlreadyBootstrapped)));
        assert_eq!(store.count().await, 1);

        let found = store.find_by_email("admin@vigil.dev").await.unwrap().unwrap();
        assert_eq!(found, account);
        assert!(store.find_by_email("other@vigil.dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_store_first_account() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledAccountStore::open(temp_dir.path()).unwrap();
        assert!(!store.exists().await.unwrap());

        let account = store.create_first(new_account("admin@vigil.dev")).await.unwrap();
        assert!(store.exists().await.unwrap());

        let found = store.find_by_email("admin@vigil.dev").await.unwrap().unwrap();
        assert_eq!(found, account);

        let again = store.create_first(new_account("admin@vigil.dev")).await;
        assert!(matches!(again, Err(AuthError::AlreadyBootstrapped)));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_sled_store_concurrent_first_account() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SledAccountStore::open(temp_dir.path()).unwrap());

        let attempts = (0..50).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_first(new_account(&format!("user{i}@vigil.dev"))).await })
        });
        let results = futures::future::join_all(attempts).await;

        let created = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(AuthError::AlreadyBootstrapped))))
            .count();
        assert_eq!(created, 1);
        assert_eq!(rejected, 49);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sled_set_flags() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledAccountStore::open(temp_dir.path()).unwrap();
        store.create_first(new_account("admin@vigil.dev")).await.unwrap();

        let updated = store.set_flags("admin@vigil.dev", None, Some(true)).unwrap();
        assert!(updated.suspended);
        assert!(updated.enabled);
        assert!(!updated.can_login());

        let reloaded = store.find_by_email("admin@vigil.dev").await.unwrap().unwrap();
        assert_eq!(reloaded, updated);

        assert!(matches!(
            store.set_flags("nobody@vigil.dev", Some(false), None),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn test_public_account_hides_hash() {
        let account = new_account("admin@vigil.dev").into_account();
        let json = serde_json::to_value(account.to_public()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "admin@vigil.dev");
        assert_eq!(json["enabled"], true);
        assert!(json.get("createdAt").is_some());
    }
}
