//! Serve command - run the gateway server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use vigil_gateway::GatewayConfig;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Config file override.
    pub config: Option<PathBuf>,
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
}

/// Run the gateway until Ctrl-C.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config =
        GatewayConfig::load_or_default(args.config.as_deref()).context("Failed to load gateway config")?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config.validate()?;
    tracing::debug!(?config, "Gateway config resolved");

    ui::header("Starting Vigil Gateway");
    ui::kv("Address", &config.listen_address());
    ui::kv("Data", &config.data_dir.display().to_string());
    println!();

    vigil_gateway::start(config).await?;

    Ok(())
}
