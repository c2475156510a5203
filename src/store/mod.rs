//! Data Layer Contract
//!
//! Queries are issued through [`QueryParameterBinder`], which takes a
//! statement template and a list of bound values. The template is a
//! `&'static str`, so statement text assembled from request data at runtime
//! cannot be passed in at all.
//!
//! - `sqlite.rs`: SQLite implementation, one connection per call
//! - `users.rs`: the `users` lookups the HTTP layer needs

mod sqlite;
mod users;

pub use sqlite::{bootstrap, SqliteBinder};
pub use users::{User, UserDirectory};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ErrorKind;

/// One result row, column name to value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Integer(i64),
    Text(String),
    Null,
}

impl From<i64> for BoundValue {
    fn from(v: i64) -> Self {
        BoundValue::Integer(v)
    }
}

impl From<&str> for BoundValue {
    fn from(v: &str) -> Self {
        BoundValue::Text(v.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(v: String) -> Self {
        BoundValue::Text(v)
    }
}

/// Errors from the data layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("query worker failed")]
    Worker(#[source] tokio::task::JoinError),

    #[error("row could not be decoded")]
    Decode(#[source] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Timeout(_) => "store_timeout",
            _ => "internal_error",
        }
    }
}

/// Parameterized statement execution
///
/// Implementations must give every call its own connection or session;
/// a single handle is never shared across concurrent requests.
#[async_trait]
pub trait QueryParameterBinder: Send + Sync {
    async fn execute(
        &self,
        statement: &'static str,
        params: Vec<BoundValue>,
    ) -> Result<Vec<Row>, StoreError>;
}
