//! Key/value configuration source for signing parameters.
//!
//! The auth core only ever reads from a [`SecretStore`]. Writing is an
//! operator concern, exposed as inherent methods on the concrete stores.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AuthError;

/// Name of the sled tree holding configuration values.
const CONFIG_TREE: &str = "config";

/// Read-only key/value source.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a value by key. `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
}

/// In-memory store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `pairs`.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Set a value.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().await.insert(key.into(), value.into());
    }

    /// Remove a value.
    pub async fn remove(&self, key: &str) {
        self.values.write().await.remove(key);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.values.read().await.get(key).cloned())
    }
}

/// Store backed by a sled tree.
#[derive(Clone)]
pub struct SledSecretStore {
    tree: sled::Tree,
}

impl SledSecretStore {
    /// Open the config tree inside an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, AuthError> {
        let tree = db
            .open_tree(CONFIG_TREE)
            .map_err(|e| AuthError::Storage(format!("Failed to open config tree: {e}")))?;
        Ok(Self { tree })
    }

    /// Set a value, returning whether it replaced an existing one.
    ///
    /// # Errors
    ///
    /// Returns error if the write or flush fails.
    pub fn set(&self, key: &str, value: &str) -> Result<bool, AuthError> {
        let previous = self
            .tree
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| AuthError::Storage(format!("Insert error: {e}")))?;
        self.tree
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;
        Ok(previous.is_some())
    }

    /// Set a value only if the key is absent. Returns whether it was written.
    ///
    /// # Errors
    ///
    /// Returns error if the write or flush fails.
    pub fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, AuthError> {
        let swapped = self
            .tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value.as_bytes()))
            .map_err(|e| AuthError::Storage(format!("Insert error: {e}")))?
            .is_ok();
        self.tree
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;
        Ok(swapped)
    }

    /// Read a value synchronously.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the value is not UTF-8.
    pub fn get_sync(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.tree
            .get(key.as_bytes())
            .map_err(|e| AuthError::Storage(format!("Get error: {e}")))?
            .map(|v| {
                String::from_utf8(v.to_vec())
                    .map_err(|e| AuthError::Storage(format!("Value for {key} is not UTF-8: {e}")))
            })
            .transpose()
    }

    /// List all keys.
    ///
    /// # Errors
    ///
    /// Returns error if iteration fails.
    pub fn keys(&self) -> Result<Vec<String>, AuthError> {
        self.tree
            .iter()
            .keys()
            .map(|k| {
                k.map(|k| String::from_utf8_lossy(&k).into_owned())
                    .map_err(|e| AuthError::Storage(format!("Iter error: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl SecretStore for SledSecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.get_sync(&key)).await?
    }
}

impl std::fmt::Debug for SledSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledSecretStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySecretStore::from_pairs([("jwt_issuer", "vigil.test")]);
        assert_eq!(store.get("jwt_issuer").await.unwrap().as_deref(), Some("vigil.test"));
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("jwt_issuer", "other").await;
        assert_eq!(store.get("jwt_issuer").await.unwrap().as_deref(), Some("other"));

        store.remove("jwt_issuer").await;
        assert!(store.get("jwt_issuer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let db = sled::open(temp_dir.path()).unwrap();
        let store = SledSecretStore::with_db(&db).unwrap();

        assert!(store.get("jwt_secret").await.unwrap().is_none());
        assert!(!store.set("jwt_secret", "s3cret").unwrap());
        assert!(store.set("jwt_secret", "rotated").unwrap());
        assert_eq!(store.get("jwt_secret").await.unwrap().as_deref(), Some("rotated"));

        assert!(!store.set_if_absent("jwt_secret", "ignored").unwrap());
        assert!(store.set_if_absent("jwt_issuer", "vigil.test").unwrap());
        assert_eq!(store.get_sync("jwt_secret").unwrap().as_deref(), Some("rotated"));

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["jwt_issuer".to_string(), "jwt_secret".to_string()]);
    }
}
