//! Status command - bootstrap and signing configuration health.

use std::path::Path;

use anyhow::Result;
use vigil_auth::{AccountStore, SigningConfig};

use super::open_auth_db;
use crate::ui::{self, CheckStatus};

/// Run the status command.
pub async fn run_status(config_path: Option<&Path>) -> Result<()> {
    let db = open_auth_db(config_path)?;

    ui::header("Vigil Status");

    println!();
    ui::info("Accounts");
    if db.accounts.exists().await? {
        let count = db.accounts.list()?.len();
        ui::check("Bootstrap", CheckStatus::Ok, Some(&format!("{count} account(s)")));
    } else {
        ui::check("Bootstrap", CheckStatus::Warning, Some("no accounts yet"));
        ui::info("  Create the first one with POST /v1/auth/user");
    }

    println!();
    ui::info("Signing configuration");
    match SigningConfig::load(&db.secrets).await {
        Ok(config) => {
            ui::check("Config", CheckStatus::Ok, Some("complete"));
            ui::kv("  Issuer", config.issuer());
            ui::kv("  Algorithm", &format!("{:?}", config.algorithm()));
        }
        Err(e) => {
            ui::check("Config", CheckStatus::Error, Some(&e.to_string()));
            ui::info("  Run 'vigil config init' to write signing parameters");
        }
    }

    Ok(())
}
