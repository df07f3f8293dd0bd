//! MySQL Backend Implementation
//!
//! Implements [`Database`] over an sqlx `MySqlPool`. Statements are sent as
//! plain text (no prepared-statement round trip), which is what DDL such as
//! `RENAME TABLE` and `SHOW CREATE TABLE` need.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, Row as SqlxRow, ValueRef};

use super::core::{Database, DatabaseValue, QueryOutput, Row};
use crate::error::{SchemaError, SchemaResult};

/// MySQL database handle
pub struct MySqlHandle {
    pool: MySqlPool,
    last_error: Mutex<Option<String>>,
}

impl MySqlHandle {
    /// Wrap an existing pool
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            last_error: Mutex::new(None),
        }
    }

    /// Connect with a single pooled connection so every statement sees the
    /// same session (`DATABASE()`, session variables)
    pub async fn connect(database_url: &str) -> SchemaResult<Self> {
        if !database_url.starts_with("mysql://") && !database_url.starts_with("mariadb://") {
            return Err(SchemaError::Database(format!(
                "Invalid MySQL URL scheme: {}",
                database_url
            )));
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(|e| SchemaError::Database(format!("Failed to connect to MySQL: {}", e)))?;

        tracing::debug!("MySQL connection established");
        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn remember_error(&self, message: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = message;
        }
    }
}

#[async_trait]
impl Database for MySqlHandle {
    async fn execute(&self, sql: &str) -> SchemaResult<QueryOutput> {
        tracing::debug!(target: "tidemark::sql", "{}", sql);

        let result = if returns_rows(sql) {
            (&self.pool)
                .fetch_all(sql)
                .await
                .map(|rows| QueryOutput::rows(rows.iter().map(convert_row).collect()))
        } else {
            (&self.pool)
                .execute(sql)
                .await
                .map(|done| QueryOutput::affected(done.rows_affected()))
        };

        match result {
            Ok(output) => {
                self.remember_error(None);
                Ok(output)
            }
            Err(e) => {
                let message = e.to_string();
                self.remember_error(Some(message.clone()));
                Err(SchemaError::Database(message))
            }
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Whether a statement produces a result set
fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH"
    )
}

fn convert_row(row: &MySqlRow) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name(), decode_value(row, index));
    }
    out
}

fn decode_value(row: &MySqlRow, index: usize) -> DatabaseValue {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return DatabaseValue::Null,
        Err(_) => return DatabaseValue::Null,
        Ok(_) => {}
    }

    if let Ok(value) = row.try_get::<i64, _>(index) {
        return DatabaseValue::Int64(value);
    }
    if let Ok(value) = row.try_get::<u64, _>(index) {
        return DatabaseValue::UInt64(value);
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return DatabaseValue::Float64(value);
    }
    if let Ok(value) = row.try_get::<String, _>(index) {
        return DatabaseValue::String(value);
    }
    if let Ok(value) = row.try_get::<Vec<u8>, _>(index) {
        return DatabaseValue::Bytes(value);
    }

    tracing::warn!("Unable to decode column {} of result row", index);
    DatabaseValue::Null
}
