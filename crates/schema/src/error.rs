//! Error types for schema operations
//!
//! Every fallible operation in the crate returns [`SchemaResult`]. The
//! variants classify failures so the calling layer can decide what is
//! recoverable (annotation and precondition problems) and what must stop a
//! run (statement failures, aborted transforms).

use thiserror::Error;

use crate::transform::TransformState;

/// Result type alias for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Error types for schema, migration and transform operations
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Malformed, ambiguous or contradictory annotation tags
    #[error("Annotation error on field '{field}': {message}")]
    Annotation { field: String, message: String },

    /// The named table does not exist
    #[error("Table '{0}' not found")]
    NotFound(String),

    /// Two schema views diverge in a way the change vocabulary cannot express
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A rename or drop collides with another change in the same diff
    #[error("Migration conflict: {0}")]
    MigrationConflict(String),

    /// The copy-swap engine stopped
    #[error("Transform aborted during {stage}: {reason}{}", if *.manual_intervention { " (manual intervention required)" } else { "" })]
    TransformAborted {
        stage: TransformState,
        reason: String,
        manual_intervention: bool,
    },

    /// A single DDL/DML statement failed; earlier statements are committed
    #[error("Statement failed in {context}: {message}\n  statement: {statement}")]
    StatementFailed {
        context: String,
        statement: String,
        message: String,
    },

    /// Migration files or tracking data are unusable
    #[error("Migration error: {0}")]
    Migration(String),

    /// Database driver or connection error
    #[error("Database error: {0}")]
    Database(String),

    /// Snapshot or descriptor (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    pub fn annotation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaError::Annotation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn transform_aborted(stage: TransformState, reason: impl Into<String>) -> Self {
        SchemaError::TransformAborted {
            stage,
            reason: reason.into(),
            manual_intervention: false,
        }
    }

    /// Failures at or after the swap are never retried or cleaned up
    pub fn manual_intervention(stage: TransformState, reason: impl Into<String>) -> Self {
        SchemaError::TransformAborted {
            stage,
            reason: reason.into(),
            manual_intervention: true,
        }
    }

    /// Whether the calling layer can offer a fix and retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            SchemaError::Annotation { .. } | SchemaError::MigrationConflict(_) => true,
            SchemaError::TransformAborted {
                manual_intervention,
                ..
            } => !manual_intervention,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for SchemaError {
    fn from(err: sqlx::Error) -> Self {
        SchemaError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SchemaError {
    fn from(err: serde_yaml::Error) -> Self {
        SchemaError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display_flags_manual_intervention() {
        let err = SchemaError::manual_intervention(TransformState::Swapping, "rename failed");
        let msg = err.to_string();
        assert!(msg.contains("Swapping"));
        assert!(msg.contains("manual intervention required"));
        assert!(!err.is_recoverable());

        let err = SchemaError::transform_aborted(TransformState::Planning, "no primary key");
        assert!(!err.to_string().contains("manual"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_statement_failure_reports_statement_verbatim() {
        let err = SchemaError::StatementFailed {
            context: "migration 20240101_000000_add_email".to_string(),
            statement: "ALTER TABLE `users` ADD COLUMN `email` VARCHAR(255) NULL".to_string(),
            message: "Duplicate column name 'email'".to_string(),
        };
        assert!(err
            .to_string()
            .contains("ALTER TABLE `users` ADD COLUMN `email` VARCHAR(255) NULL"));
    }
}
