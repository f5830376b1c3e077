//! Input validation for account credentials.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use validator::ValidateEmail;

use super::AuthError;

/// Maximum accepted email length in bytes.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Normalize an email for storage and lookup: trim, NFKC, lowercase.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Normalize and validate an email address.
///
/// # Errors
///
/// Returns `Validation` if the address is empty, too long or malformed.
pub fn validate_email(email: &str) -> Result<String, AuthError> {
    let normalized = normalize_email(email);

    if normalized.is_empty() {
        return Err(AuthError::Validation("email is required".to_string()));
    }
    if normalized.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::Validation(format!(
            "email exceeds {MAX_EMAIL_LENGTH} bytes"
        )));
    }
    if !normalized.validate_email() {
        return Err(AuthError::Validation("email is not a valid address".to_string()));
    }

    Ok(normalized)
}

/// Password acceptance rules, supplied by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Maximum length in characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Require at least one letter and one digit.
    #[serde(default)]
    pub require_mixed: bool,
}

const fn default_min_length() -> usize {
    8
}

const fn default_max_length() -> usize {
    128
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            require_mixed: false,
        }
    }
}

impl PasswordPolicy {
    /// Check a password against the policy.
    ///
    /// # Errors
    ///
    /// Returns `Validation` describing the first rule that fails.
    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        let length = password.chars().count();

        if length < self.min_length {
            return Err(AuthError::Validation(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        if length > self.max_length {
            return Err(AuthError::Validation(format!(
                "password must be at most {} characters",
                self.max_length
            )));
        }
        if password.trim().is_empty() {
            return Err(AuthError::Validation("password must not be blank".to_string()));
        }
        if self.require_mixed {
            let has_letter = password.chars().any(char::is_alphabetic);
            let has_digit = password.chars().any(|c| c.is_ascii_digit());
            if !(has_letter && has_digit) {
                return Err(AuthError::Validation(
                    "password must contain letters and digits".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Check that the policy itself is coherent.
    ///
    /// # Errors
    ///
    /// Returns a description if the bounds are zero or inverted.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_length == 0 {
            return Err("password minLength must be at least 1".to_string());
        }
        if self.max_length < self.min_length {
            return Err("password maxLength must not be below minLength".to_string());
        }
        Ok(())
    }
}
