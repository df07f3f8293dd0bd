//! Core Database Handle Traits
//!
//! Every component talks to the database through [`Database`], a deliberately
//! narrow handle: run one SQL string, escape a string value, and report the
//! last driver error. No component holds a global connection; the handle is
//! passed in by the caller.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{SchemaError, SchemaResult};

/// Abstract database handle
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one SQL statement and return its rows and affected-row count
    async fn execute(&self, sql: &str) -> SchemaResult<QueryOutput>;

    /// Escape a string value for inclusion inside a single-quoted literal
    fn escape(&self, value: &str) -> String {
        escape_string(value)
    }

    /// Message of the most recent failed statement, if any
    fn last_error(&self) -> Option<String>;
}

/// Result of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub affected: u64,
}

impl QueryOutput {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self { rows, affected: 0 }
    }

    pub fn affected(affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected,
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// One result row, keyed by column label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, DatabaseValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly used by test doubles
    pub fn with(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.values.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: DatabaseValue) {
        self.values.insert(column.to_string(), value);
    }

    /// Look up a column, ignoring case (information_schema labels vary by server)
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.values.get(column).or_else(|| {
            self.values
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value)
        })
    }

    /// Column as text; `None` for SQL NULL or a missing column
    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column).and_then(DatabaseValue::as_string)
    }

    /// Column as text, failing when missing or NULL
    pub fn require_str(&self, column: &str) -> SchemaResult<String> {
        self.get_str(column)
            .ok_or_else(|| SchemaError::Database(format!("Column '{}' missing from result row", column)))
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(DatabaseValue::as_i64)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Database value enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            DatabaseValue::Int64(i) => Some(i.to_string()),
            DatabaseValue::UInt64(u) => Some(u.to_string()),
            DatabaseValue::Float64(f) => Some(f.to_string()),
            DatabaseValue::String(s) => Some(s.clone()),
            DatabaseValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Bool(b) => Some(*b as i64),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::UInt64(u) => i64::try_from(*u).ok(),
            DatabaseValue::Float64(f) => Some(*f as i64),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            DatabaseValue::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            DatabaseValue::Null => None,
        }
    }

    /// Render as a SQL literal: numbers bare, text escaped and quoted
    pub fn to_sql_literal(&self) -> String {
        match self {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::UInt64(u) => u.to_string(),
            DatabaseValue::Float64(f) => f.to_string(),
            DatabaseValue::String(s) => quote_literal(s),
            DatabaseValue::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                format!("X'{}'", hex)
            }
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int64(i) => JsonValue::Number((*i).into()),
            DatabaseValue::UInt64(u) => JsonValue::Number((*u).into()),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int64(value as i64)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<u64> for DatabaseValue {
    fn from(value: u64) -> Self {
        DatabaseValue::UInt64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Escape a value for a MySQL single-quoted string literal
pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        match ch {
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\x1a' => escaped.push_str("\\Z"),
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escape and wrap in single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_string(value))
}

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string_handles_specials() {
        assert_eq!(escape_string("it's"), "it\\'s");
        assert_eq!(escape_string("a\\b"), "a\\\\b");
        assert_eq!(escape_string("line\nbreak"), "line\\nbreak");
        assert_eq!(quote_literal("O'Brien"), "'O\\'Brien'");
    }

    #[test]
    fn test_quote_identifier_doubles_backticks() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new()
            .with("COLUMN_NAME", "email")
            .with("ORDINAL_POSITION", 3i64);
        assert_eq!(row.get_str("column_name").as_deref(), Some("email"));
        assert_eq!(row.get_i64("ordinal_position"), Some(3));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_sql_literal_rendering() {
        assert_eq!(DatabaseValue::Int64(42).to_sql_literal(), "42");
        assert_eq!(DatabaseValue::from("a'b").to_sql_literal(), "'a\\'b'");
        assert_eq!(DatabaseValue::Null.to_sql_literal(), "NULL");
        assert_eq!(DatabaseValue::Bytes(vec![0xAB, 0x01]).to_sql_literal(), "X'AB01'");
    }
}
