//! SQLite binder

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{BoundValue, QueryParameterBinder, Row, StoreError};
use crate::deadline::Deadline;

impl ToSql for BoundValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            BoundValue::Integer(v) => v.to_sql(),
            BoundValue::Text(v) => v.to_sql(),
            BoundValue::Null => Ok(ToSqlOutput::Borrowed(ValueRef::Null)),
        }
    }
}

/// Runs statements against a SQLite file, opening a fresh connection per call
#[derive(Debug, Clone)]
pub struct SqliteBinder {
    path: PathBuf,
    deadline: Deadline,
}

impl SqliteBinder {
    pub fn new(path: impl Into<PathBuf>, deadline: Deadline) -> Self {
        Self {
            path: path.into(),
            deadline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl QueryParameterBinder for SqliteBinder {
    async fn execute(
        &self,
        statement: &'static str,
        params: Vec<BoundValue>,
    ) -> Result<Vec<Row>, StoreError> {
        let path = self.path.clone();
        let busy = self.deadline.duration();

        let task = tokio::task::spawn_blocking(move || -> Result<Vec<Row>, StoreError> {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(busy)?;
            run_statement(&conn, statement, &params)
        });

        match self.deadline.run(task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Worker(join)),
            Err(elapsed) => Err(StoreError::Timeout(elapsed.0)),
        }
    }
}

fn run_statement(
    conn: &Connection,
    statement: &'static str,
    params: &[BoundValue],
) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        let mut out = Row::new();
        for (i, name) in columns.iter().enumerate() {
            out.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        Ok(out)
    })?;

    let rows = rows.collect::<Result<Vec<_>, _>>()?;
    debug!(rows = rows.len(), "Statement executed");
    Ok(rows)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Create the `users` table and seed demo rows when it is empty
pub fn bootstrap(path: &Path, seed_demo_users: bool) -> Result<(), StoreError> {
    let conn = Connection::open(path)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
        [],
    )?;

    if seed_demo_users {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if count == 0 {
            for (name, email) in [("Alice", "alice@example.com"), ("Bob", "bob@example.com")] {
                conn.execute(
                    "INSERT INTO users (name, email) VALUES (?1, ?2)",
                    params![name, email],
                )?;
            }
            info!(path = ?path, "Seeded demo users");
        }
    }

    Ok(())
}
