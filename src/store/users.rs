//! User lookups

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{BoundValue, QueryParameterBinder, Row, StoreError};

const FIND_BY_ID: &str = "SELECT id, name, email FROM users WHERE id = ?1";
const FIND_BY_NAME: &str = "SELECT id, name, email FROM users WHERE name = ?1 ORDER BY id";

/// A row of the `users` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

impl TryFrom<Row> for User {
    type Error = StoreError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(row)).map_err(StoreError::Decode)
    }
}

/// Typed access to `users` through a [`QueryParameterBinder`]
#[derive(Clone)]
pub struct UserDirectory {
    binder: Arc<dyn QueryParameterBinder>,
}

impl UserDirectory {
    pub fn new(binder: Arc<dyn QueryParameterBinder>) -> Self {
        Self { binder }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let rows = self
            .binder
            .execute(FIND_BY_ID, vec![BoundValue::Integer(id)])
            .await?;
        rows.into_iter().next().map(User::try_from).transpose()
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Vec<User>, StoreError> {
        let rows = self.binder.execute(FIND_BY_NAME, vec![name.into()]).await?;
        rows.into_iter().map(User::try_from).collect()
    }
}
