//! Config command - signing parameters in the secret store.

use std::path::Path;

use anyhow::{Result, bail};
use vigil_auth::SigningConfig;
use vigil_auth::config::{is_hmac, keys, parse_algorithm, parse_lifetime};

use super::open_auth_db;
use crate::ui;

/// Arguments for `config init`.
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Signing secret; generated when absent.
    pub secret: Option<String>,
    /// Token issuer.
    pub issuer: String,
    /// Access token lifetime.
    pub access_expiry: String,
    /// Refresh token lifetime.
    pub refresh_expiry: String,
    /// Signing algorithm.
    pub algorithm: String,
    /// Overwrite existing values.
    pub force: bool,
}

/// Config actions.
#[derive(Debug, Clone)]
pub enum ConfigAction {
    /// Write all signing parameters.
    Init(InitArgs),
    /// Show one or all parameters.
    Get { key: Option<String>, reveal: bool },
    /// Set one parameter.
    Set { key: String, value: String },
    /// Validate the full set.
    Check,
}

/// Run the config command.
pub async fn run_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let db = open_auth_db(config_path)?;
    let store = &db.secrets;

    match action {
        ConfigAction::Init(args) => {
            let secret = args.secret.unwrap_or_else(generate_secret);
            let values = [
                (keys::SECRET, secret),
                (keys::ISSUER, args.issuer),
                (keys::ALGORITHM, args.algorithm),
                (keys::ACCESS_EXPIRY, args.access_expiry),
                (keys::REFRESH_EXPIRY, args.refresh_expiry),
            ];
            for (key, value) in &values {
                check_value(key, value)?;
            }

            for (key, value) in &values {
                if args.force {
                    store.set(key, value)?;
                    ui::success(&format!("{key} written"));
                } else if store.set_if_absent(key, value)? {
                    ui::success(&format!("{key} written"));
                } else {
                    ui::info(&format!("{key} kept (use --force to overwrite)"));
                }
            }
            report(store).await
        }

        ConfigAction::Get { key, reveal } => {
            let requested: Vec<&str> = match &key {
                Some(key) => vec![known_key(key)?],
                None => keys::ALL.to_vec(),
            };
            for key in requested {
                let value = store.get_sync(key)?;
                let shown = match value {
                    None => "(unset)".to_string(),
                    Some(_) if key == keys::SECRET && !reveal => "********".to_string(),
                    Some(value) => value,
                };
                ui::kv(key, &shown);
            }
            Ok(())
        }

        ConfigAction::Set { key, value } => {
            let key = known_key(&key)?;
            check_value(key, &value)?;
            let replaced = store.set(key, &value)?;
            ui::success(&format!(
                "{key} {}",
                if replaced { "updated" } else { "set" }
            ));
            ui::info("Restart the gateway to apply the change");
            Ok(())
        }

        ConfigAction::Check => report(store).await,
    }
}

async fn report(store: &vigil_auth::SledSecretStore) -> Result<()> {
    match SigningConfig::load(store).await {
        Ok(config) => {
            ui::success("Signing configuration is complete");
            ui::kv("Issuer", config.issuer());
            ui::kv("Algorithm", &format!("{:?}", config.algorithm()));
            ui::kv("Access lifetime", &format!("{}s", config.access_lifetime().as_secs()));
            ui::kv("Refresh lifetime", &format!("{}s", config.refresh_lifetime().as_secs()));
            Ok(())
        }
        Err(e) => {
            ui::error(&e.to_string());
            bail!("signing configuration is not usable")
        }
    }
}

fn known_key(key: &str) -> Result<&'static str> {
    match keys::ALL.iter().copied().find(|k| *k == key) {
        Some(key) => Ok(key),
        None => bail!("Unknown key '{key}'. Known keys: {}", keys::ALL.join(", ")),
    }
}

/// Reject values the signing config would refuse to load.
fn check_value(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{key} cannot be empty");
    }
    match key {
        keys::ALGORITHM => {
            if !is_hmac(parse_algorithm(value)?) {
                bail!("{key} must be one of HS256, HS384, HS512");
            }
        }
        keys::ACCESS_EXPIRY | keys::REFRESH_EXPIRY => {
            parse_lifetime(value).map_err(|e| anyhow::anyhow!("{key}: {e}"))?;
        }
        keys::SECRET if value.len() < 32 => {
            ui::warning("Secrets shorter than 32 bytes are weak");
        }
        _ => {}
    }
    Ok(())
}

/// Random 256-bit secret, hex encoded.
fn generate_secret() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}
