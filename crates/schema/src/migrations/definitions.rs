//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the types shared by the manager (files) and the runner
//! (tracking table): [`Migration`], [`MigrationRecord`], [`MigrationConfig`]
//! and the run/rollback results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::table::TableSchema;

/// Table name → structure, as stored next to a migration file
pub type SchemaSnapshot = BTreeMap<String, TableSchema>;

/// A migration file pair
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// `<YYYYmmdd_HHMMSS>_<name>`; sorting by id is chronological
    pub id: String,
    /// Human-readable name for the migration
    pub name: String,
    /// Statements applied by `run`
    pub up_statements: Vec<String>,
    /// Statements applied by `rollback`
    pub down_statements: Vec<String>,
    /// When the migration was created
    pub created_at: DateTime<Utc>,
    /// Structural snapshot written with the migration, if any
    pub snapshot: Option<SchemaSnapshot>,
}

impl Migration {
    pub fn statements(&self, direction: MigrationDirection) -> &[String] {
        match direction {
            MigrationDirection::Up => &self.up_statements,
            MigrationDirection::Down => &self.down_statements,
        }
    }
}

/// A row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration id
    pub migration: String,
    /// Batch number (the unit of rollback)
    pub batch: i64,
    /// When the migration was applied
    pub ran_at: DateTime<Utc>,
}

/// Configuration for the migration system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "migrations".to_string(),
        }
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationRunResult {
    /// Ids of migrations that were applied, in order
    pub applied: Vec<String>,
    /// Batch the applied migrations were recorded under
    pub batch: Option<i64>,
    /// Number of migrations that were already applied
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackResult {
    /// Ids of migrations that were rolled back, in the order they ran
    pub rolled_back: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        ran_at: DateTime<Utc>,
        /// Batch number
        batch: i64,
    },
    /// Recorded as applied but its file is gone
    Missing {
        ran_at: DateTime<Utc>,
        batch: i64,
    },
}

/// One line of `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub id: String,
    pub name: String,
    pub status: MigrationStatus,
}
