//! Phone number validation
//!
//! Outbound call targets must be E.164: a leading `+` followed by 9 to 15
//! digits. Numbers are validated before any request reaches the telephony
//! provider so malformed input fails locally with a clear error.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static E164: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+\d{9,15}$").expect("phone pattern compiles"));

/// Errors that can occur during phone number validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneValidationError {
    #[error("phone number is empty")]
    Empty,

    #[error("phone number must be E.164 (+ followed by 9-15 digits): {0}")]
    InvalidFormat(String),
}

/// Validate a phone number against the E.164 format.
pub fn validate_phone_number(number: &str) -> Result<(), PhoneValidationError> {
    let trimmed = number.trim();
    if trimmed.is_empty() {
        return Err(PhoneValidationError::Empty);
    }
    if !E164.is_match(trimmed) {
        return Err(PhoneValidationError::InvalidFormat(trimmed.to_string()));
    }
    Ok(())
}
