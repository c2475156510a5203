//! Error Taxonomy
//!
//! Every guard returns its own error enum. Each of those maps onto one of a
//! handful of [`ErrorKind`]s, which is what the HTTP layer turns into a status
//! code. [`ApiError`] is the aggregate a request handler propagates with `?`.
//!
//! None of the `Display` strings in this crate interpolate raw request input.
//! When an error needs to point at the offending piece of input it carries it
//! as a separate field (see [`ApiError::token`]).

use std::time::Duration;

use crate::exec::ExecError;
use crate::guards::{CommandError, PathError, ValidationError};
use crate::store::StoreError;

/// Coarse classification of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-grammar input
    Validation,

    /// Well-formed but disallowed by policy
    Forbidden,

    /// The requested resource is absent
    NotFound,

    /// Command or argument not whitelisted, or caller not authorized
    Authz,

    /// A bounded operation exceeded its deadline
    Timeout,

    /// A collaborator failed (store unreachable, spawn failure, ...)
    Internal,
}

/// Errors surfaced by request handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("no matching record")]
    RecordNotFound,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Command(e) => e.kind(),
            ApiError::Path(e) => e.kind(),
            ApiError::Exec(e) => e.kind(),
            ApiError::Store(e) => e.kind(),
            ApiError::Unauthorized => ErrorKind::Authz,
            ApiError::RecordNotFound => ErrorKind::NotFound,
            ApiError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Stable machine-readable code for response bodies and metrics
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(e) => e.code(),
            ApiError::Command(e) => e.code(),
            ApiError::Path(e) => e.code(),
            ApiError::Exec(e) => e.code(),
            ApiError::Store(e) => e.code(),
            ApiError::Unauthorized => "unauthorized",
            ApiError::RecordNotFound => "not_found",
            ApiError::Timeout(_) => "timeout",
        }
    }

    /// The isolated offending token, if the rejection points at one
    pub fn token(&self) -> Option<&str> {
        match self {
            ApiError::Command(e) => e.token(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_wrapped_error() {
        let err: ApiError = CommandError::ArgumentNotAllowed {
            token: "rm".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Authz);
        assert_eq!(err.code(), "argument_not_allowed");
        assert_eq!(err.token(), Some("rm"));

        let err: ApiError = ValidationError::InvalidHost.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.token(), None);

        let err: ApiError = PathError::OutsideRoot.into();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_unauthorized_is_authz() {
        assert_eq!(ApiError::Unauthorized.kind(), ErrorKind::Authz);
        assert_eq!(ApiError::RecordNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
    }
}
