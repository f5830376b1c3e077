//! Account administration commands.

use std::path::Path;

use anyhow::Result;
use vigil_auth::{SledAccountStore, validation::normalize_email};

use super::open_auth_db;
use crate::ui;

/// Account actions.
pub enum AccountAction {
    /// List all accounts.
    List,
    /// Allow login.
    Enable { email: String },
    /// Block login.
    Disable { email: String },
    /// Suspend.
    Suspend { email: String },
    /// Lift a suspension.
    Unsuspend { email: String },
}

/// Run an account command.
///
/// Flag changes do not revoke tokens already issued; they only block new
/// logins.
pub fn run_account(config_path: Option<&Path>, action: AccountAction) -> Result<()> {
    let db = open_auth_db(config_path)?;

    match action {
        AccountAction::List => list_accounts(&db.accounts),
        AccountAction::Enable { email } => set_flags(&db.accounts, &email, Some(true), None),
        AccountAction::Disable { email } => set_flags(&db.accounts, &email, Some(false), None),
        AccountAction::Suspend { email } => set_flags(&db.accounts, &email, None, Some(true)),
        AccountAction::Unsuspend { email } => set_flags(&db.accounts, &email, None, Some(false)),
    }
}

fn list_accounts(store: &SledAccountStore) -> Result<()> {
    let accounts = store.list()?;

    if accounts.is_empty() {
        ui::info("No accounts yet.");
        return Ok(());
    }

    ui::info(&format!("Accounts ({}):", accounts.len()));
    println!();
    println!(
        "{:<40} {:<38} {:<8} {:<10} {:<20}",
        "EMAIL", "ID", "ENABLED", "SUSPENDED", "CREATED"
    );
    println!("{}", "-".repeat(120));

    for account in accounts {
        println!(
            "{:<40} {:<38} {:<8} {:<10} {:<20}",
            account.email,
            account.id,
            if account.enabled { "yes" } else { "no" },
            if account.suspended { "yes" } else { "no" },
            account.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    Ok(())
}

fn set_flags(
    store: &SledAccountStore,
    email: &str,
    enabled: Option<bool>,
    suspended: Option<bool>,
) -> Result<()> {
    let account = store.set_flags(&normalize_email(email), enabled, suspended)?;

    ui::success(&format!(
        "{}: enabled={}, suspended={}",
        account.email, account.enabled, account.suspended
    ));
    if !account.can_login() {
        ui::warning("Tokens issued before this change stay valid until they expire");
    }

    Ok(())
}
