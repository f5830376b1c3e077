//! CLI command implementations.

pub mod account;
pub mod config;
pub mod serve;
pub mod status;

pub use account::run_account;
pub use config::run_config;
pub use serve::run_serve;
pub use status::run_status;

use std::path::Path;

use anyhow::{Context, Result};
use vigil_auth::{SledAccountStore, SledSecretStore};
use vigil_gateway::GatewayConfig;

/// Stores inside the gateway's auth database.
pub struct AuthDb {
    /// Account store.
    pub accounts: SledAccountStore,
    /// Secret store holding the signing parameters.
    pub secrets: SledSecretStore,
}

/// Open the auth database the gateway configured at `config_path` uses.
///
/// sled holds an exclusive lock, so this fails while the gateway runs.
pub fn open_auth_db(config_path: Option<&Path>) -> Result<AuthDb> {
    let config = GatewayConfig::load_or_default(config_path).context("Failed to load gateway config")?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let path = config.data_dir.join("auth");
    let db = sled::open(&path).with_context(|| {
        format!(
            "Failed to open {} (stop the gateway before running admin commands)",
            path.display()
        )
    })?;

    Ok(AuthDb {
        accounts: SledAccountStore::with_db(&db)?,
        secrets: SledSecretStore::with_db(&db)?,
    })
}
