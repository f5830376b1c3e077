//! Terminal output helpers.

mod output;

pub use output::{CheckStatus, check, error, header, info, kv, success, warning};
