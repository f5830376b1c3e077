//! Formatted output utilities.

use console::{Style, style};

/// Print a success message with checkmark.
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message with X.
pub fn error(msg: &str) {
    println!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message.
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header/section title.
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair.
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).bold(), value);
}

/// Status line for one check.
pub fn check(name: &str, status: CheckStatus, detail: Option<&str>) {
    let (icon, label, status_style) = match status {
        CheckStatus::Ok => (style("✓").green(), "OK", Style::new().green()),
        CheckStatus::Warning => (style("⚠").yellow(), "WARNING", Style::new().yellow()),
        CheckStatus::Error => (style("✗").red(), "ERROR", Style::new().red()),
    };

    print!("  {icon} {name}: {}", status_style.apply_to(label));
    if let Some(d) = detail {
        print!(" - {}", style(d).dim());
    }
    println!();
}

/// Outcome of a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Healthy.
    Ok,
    /// Usable but needs attention.
    Warning,
    /// Broken.
    Error,
}
