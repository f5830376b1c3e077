//! Vigil CLI - run the auth gateway and administer its state.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - authentication gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Gateway config file (JSON5)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show bootstrap and signing configuration status
    Status,

    /// Signing configuration in the secret store
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Account administration
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write signing parameters, keeping existing ones unless --force
    Init {
        /// Signing secret (random 256-bit hex when omitted)
        #[arg(long, env = "VIGIL_JWT_SECRET", hide_env_values = true)]
        secret: Option<String>,

        /// Token issuer
        #[arg(long, env = "VIGIL_JWT_ISSUER", default_value = "vigil")]
        issuer: String,

        /// Access token lifetime
        #[arg(long, env = "VIGIL_JWT_ACCESS_EXPIRY", default_value = "15m")]
        access_expiry: String,

        /// Refresh token lifetime
        #[arg(long, env = "VIGIL_JWT_REFRESH_EXPIRY", default_value = "7d")]
        refresh_expiry: String,

        /// Signing algorithm: HS256, HS384 or HS512
        #[arg(long, env = "VIGIL_JWT_ALGORITHM", default_value = "HS256")]
        algorithm: String,

        /// Overwrite existing values
        #[arg(long)]
        force: bool,
    },

    /// Show one or all signing parameters
    Get {
        /// Key (e.g., jwt_issuer); all keys when omitted
        key: Option<String>,

        /// Print the secret instead of redacting it
        #[arg(long)]
        reveal: bool,
    },

    /// Set a signing parameter
    Set {
        /// Key (e.g., jwt_access_expiry)
        key: String,

        /// Value to set
        value: String,
    },

    /// Validate the signing configuration
    Check,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// List all accounts
    List,

    /// Allow an account to log in
    Enable {
        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Block an account from logging in
    Disable {
        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Suspend an account
    Suspend {
        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Lift a suspension
    Unsuspend {
        /// Account email
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }

    let config_path = cli.config;

    match cli.command {
        Commands::Serve { port, bind } => {
            let args = commands::serve::ServeArgs {
                config: config_path,
                port,
                bind,
            };
            commands::run_serve(args).await?;
        }

        Commands::Status => {
            commands::run_status(config_path.as_deref()).await?;
        }

        Commands::Config { action } => {
            let action = match action {
                ConfigCommands::Init {
                    secret,
                    issuer,
                    access_expiry,
                    refresh_expiry,
                    algorithm,
                    force,
                } => commands::config::ConfigAction::Init(commands::config::InitArgs {
                    secret,
                    issuer,
                    access_expiry,
                    refresh_expiry,
                    algorithm,
                    force,
                }),
                ConfigCommands::Get { key, reveal } => {
                    commands::config::ConfigAction::Get { key, reveal }
                }
                ConfigCommands::Set { key, value } => {
                    commands::config::ConfigAction::Set { key, value }
                }
                ConfigCommands::Check => commands::config::ConfigAction::Check,
            };
            commands::run_config(config_path.as_deref(), action).await?;
        }

        Commands::Account { action } => {
            let action = match action {
                AccountCommands::List => commands::account::AccountAction::List,
                AccountCommands::Enable { email } => commands::account::AccountAction::Enable { email },
                AccountCommands::Disable { email } => {
                    commands::account::AccountAction::Disable { email }
                }
                AccountCommands::Suspend { email } => {
                    commands::account::AccountAction::Suspend { email }
                }
                AccountCommands::Unsuspend { email } => {
                    commands::account::AccountAction::Unsuspend { email }
                }
            };
            commands::run_account(config_path.as_deref(), action)?;
        }
    }

    Ok(())
}
