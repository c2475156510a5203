//! Boundary Guards
//!
//! Each guard sits between an untrusted value and a privileged operation and
//! either returns a typed, validated value or a typed rejection. Guards are
//! pure: they hold only immutable policy and never read process state.
//!
//! - `command.rs`: program and argument whitelisting
//! - `path.rs`: file name confinement to a root directory
//! - `host.rs`: host identifier grammar
//! - `payload.rs`: structured payload decoding and shape gating
//! - `secret.rs`: presence-only view of a configured secret

mod command;
mod host;
mod path;
mod payload;
mod secret;

pub use command::{
    AllowedArgs, AllowedCommandSpec, AllowedCommandTable, CommandAuthorizer, CommandError,
    CommandLine, TableError, Tokens,
};
pub use host::{HostToken, HostnameValidator};
pub use path::{CanonicalPath, PathConfinementGuard, PathError};
pub use payload::{PayloadTypeValidator, StructuredValue};
pub use secret::Secret;

/// Rejections of malformed or out-of-grammar input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("required parameter '{0}' is missing")]
    MissingParameter(&'static str),

    #[error("parameter '{0}' has an invalid value")]
    InvalidParameter(&'static str),

    #[error("query string could not be decoded")]
    MalformedQuery,

    #[error("host is not a valid host identifier")]
    InvalidHost,

    #[error("payload could not be decoded")]
    MalformedPayload,

    #[error("payload top level must be an object or an array, found {found}")]
    UnexpectedShape { found: &'static str },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingParameter(_) => "missing_parameter",
            ValidationError::InvalidParameter(_) => "invalid_parameter",
            ValidationError::MalformedQuery => "malformed_query",
            ValidationError::InvalidHost => "invalid_host",
            ValidationError::MalformedPayload => "malformed_payload",
            ValidationError::UnexpectedShape { .. } => "unexpected_shape",
        }
    }
}
