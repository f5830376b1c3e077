//! Gateway configuration.
//!
//! JSON5 file, by default at `~/.vigil/gateway.json`. Signing parameters are
//! not part of it: they live in the secret store.

use std::path::{Path, PathBuf};

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_auth::{HashParams, PasswordPolicy};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Browser origins allowed by CORS. Empty disables CORS.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Directory holding the auth database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Rules for first-user passwords.
    #[serde(default)]
    pub password_policy: PasswordPolicy,
    /// Argon2id cost parameters for new hashes.
    #[serde(default)]
    pub argon2: HashParams,
    /// Login attempts allowed per email per minute.
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: u32,
}

const fn default_port() -> u16 {
    18790
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vigil")
}

const fn default_login_attempts() -> u32 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            cors_origins: Vec::new(),
            data_dir: default_data_dir(),
            password_policy: PasswordPolicy::default(),
            argon2: HashParams::default(),
            login_attempts_per_minute: default_login_attempts(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    let config = Self::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate JSON5 text.
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("gateway.json")
    }

    /// Get the Vigil state directory.
    ///
    /// Checks `VIGIL_STATE_DIR` first, then `~/.vigil`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("VIGIL_STATE_DIR") {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
    }

    /// Socket address string the server binds to.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bindAddress cannot be empty".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "dataDir cannot be empty".to_string(),
            ));
        }
        for origin in &self.cors_origins {
            if !(origin.starts_with("http://") || origin.starts_with("https://"))
                || HeaderValue::from_str(origin).is_err()
            {
                return Err(ConfigError::Validation(format!(
                    "corsOrigins entry is not an http(s) origin: {origin:?}"
                )));
            }
        }
        if self.login_attempts_per_minute == 0 {
            return Err(ConfigError::Validation(
                "loginAttemptsPerMinute must be at least 1".to_string(),
            ));
        }
        self.password_policy
            .validate()
            .map_err(ConfigError::Validation)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 18790);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert!(config.cors_origins.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json5_parsing() {
        let config = GatewayConfig::parse(
            r#"{
                // comments and trailing commas are fine
                port: 9000,
                bindAddress: "0.0.0.0",
                dataDir: "/var/lib/vigil",
                passwordPolicy: { minLength: 12 },
                argon2: { memoryKib: 65536, iterations: 3, parallelism: 2 },
                loginAttemptsPerMinute: 5,
                corsOrigins: ["https://console.vigil.dev"],
            }"#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.listen_address(), "0.0.0.0:9000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/vigil"));
        assert_eq!(config.password_policy.min_length, 12);
        assert_eq!(config.password_policy.max_length, 128);
        assert_eq!(config.argon2.memory_kib, 65536);
        assert_eq!(config.login_attempts_per_minute, 5);
        assert_eq!(config.cors_origins, vec!["https://console.vigil.dev".to_string()]);
    }

    #[test]
    fn test_config_validation() {
        for content in [
            "{ port: 0 }",
            "{ dataDir: \"\" }",
            "{ loginAttemptsPerMinute: 0 }",
            "{ passwordPolicy: { minLength: 20, maxLength: 10 } }",
            "{ bindAddress: \" \" }",
            "{ corsOrigins: [\"*\"] }",
            "{ corsOrigins: [\"console.vigil.dev\"] }",
        ] {
            assert!(
                matches!(GatewayConfig::parse(content), Err(ConfigError::Validation(_))),
                "accepted {content}"
            );
        }
        assert!(matches!(
            GatewayConfig::parse("{ port: "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("gateway.json");
        std::fs::write(&path, "{ port: 8081 }").unwrap();

        let config = GatewayConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.port, 8081);

        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(
            GatewayConfig::load_or_default(Some(&missing)),
            Err(ConfigError::Io(_))
        ));
    }
}
