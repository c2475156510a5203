//! Hostname shape validation

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use super::ValidationError;

lazy_static! {
    static ref HOST_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9.-]+$").expect("host pattern is a valid regex");
}

/// A string that matches `^[A-Za-z0-9.-]+$` and nothing else
///
/// Only [`HostnameValidator::validate`] produces one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostToken(String);

impl HostToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HostToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Approves strings that are syntactically valid host identifiers
///
/// This is a grammar check only. It performs no DNS resolution.
pub struct HostnameValidator;

impl HostnameValidator {
    pub fn validate(raw: &str) -> Result<HostToken, ValidationError> {
        // `$` in the regex crate matches only at the very end, never before a
        // trailing newline
        if HOST_PATTERN.is_match(raw) {
            Ok(HostToken(raw.to_string()))
        } else {
            Err(ValidationError::InvalidHost)
        }
    }
}
