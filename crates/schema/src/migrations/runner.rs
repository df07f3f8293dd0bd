//! Migration Runner - Executes migrations against the database
//!
//! Applies pending migrations statement by statement and records each one in
//! the tracking table under a batch number. DDL is not transactional on
//! MySQL, so a failing statement stops the run and leaves the statements
//! before it applied; the failing migration is not recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::definitions::{
    Migration, MigrationDirection, MigrationRecord, MigrationRunResult, MigrationStatus,
    MigrationStatusEntry,
};
use super::manager::MigrationManager;
use crate::backends::{quote_identifier, quote_literal, Database};
use crate::error::{SchemaError, SchemaResult};

const RAN_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    manager: MigrationManager,
    db: Arc<dyn Database>,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(manager: MigrationManager, db: Arc<dyn Database>) -> Self {
        Self { manager, db }
    }

    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    /// Run all pending migrations as one batch
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> SchemaResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.ensure_migrations_table().await?;

        let all = self.manager.load_migrations().await?;
        let applied = self.applied_ids().await?;
        let pending: Vec<Migration> = all
            .into_iter()
            .filter(|m| !applied.contains_key(&m.id))
            .collect();

        if pending.is_empty() {
            tracing::info!("Nothing to migrate");
            return Ok(MigrationRunResult {
                skipped_count: applied.len(),
                execution_time_ms: start_time.elapsed().as_millis(),
                ..Default::default()
            });
        }

        let batch = self.next_batch_number().await?;
        let mut result = MigrationRunResult {
            batch: Some(batch),
            skipped_count: applied.len(),
            ..Default::default()
        };

        for migration in &pending {
            tracing::info!("Migrating: {}", migration.id);
            self.execute_statements(migration, MigrationDirection::Up)
                .await?;
            self.record(&migration.id, batch).await?;
            tracing::info!("Migrated: {}", migration.id);
            result.applied.push(migration.id.clone());
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    /// The statements `run` would execute, per pending migration, without executing them
    pub async fn pretend(&self) -> SchemaResult<Vec<(String, Vec<String>)>> {
        let applied = if self.tracking_table_exists().await? {
            self.applied_ids().await?
        } else {
            HashMap::new()
        };
        Ok(self
            .manager
            .load_migrations()
            .await?
            .into_iter()
            .filter(|m| !applied.contains_key(&m.id))
            .map(|m| (m.id, m.up_statements))
            .collect())
    }

    /// Every known migration with its state, plus tracked ones whose file is gone
    pub async fn status(&self) -> SchemaResult<Vec<MigrationStatusEntry>> {
        let migrations = self.manager.load_migrations().await?;
        let records = if self.tracking_table_exists().await? {
            self.applied_migrations().await?
        } else {
            Vec::new()
        };
        let mut by_id: HashMap<&str, &MigrationRecord> =
            records.iter().map(|r| (r.migration.as_str(), r)).collect();

        let mut entries: Vec<MigrationStatusEntry> = migrations
            .iter()
            .map(|migration| MigrationStatusEntry {
                id: migration.id.clone(),
                name: migration.name.clone(),
                status: match by_id.remove(migration.id.as_str()) {
                    Some(record) => MigrationStatus::Applied {
                        ran_at: record.ran_at,
                        batch: record.batch,
                    },
                    None => MigrationStatus::Pending,
                },
            })
            .collect();

        for record in records.iter().filter(|r| by_id.contains_key(r.migration.as_str())) {
            tracing::warn!("Applied migration {} has no file", record.migration);
            entries.push(MigrationStatusEntry {
                id: record.migration.clone(),
                name: record.migration.clone(),
                status: MigrationStatus::Missing {
                    ran_at: record.ran_at,
                    batch: record.batch,
                },
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    /// Create the tracking table if it does not exist
    pub async fn ensure_migrations_table(&self) -> SchemaResult<()> {
        let table = &self.manager.config().migrations_table;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  `id` INT UNSIGNED NOT NULL AUTO_INCREMENT,\n  `migration` VARCHAR(255) NOT NULL,\n  `batch` INT NOT NULL,\n  `ran_at` DATETIME NOT NULL,\n  PRIMARY KEY (`id`),\n  UNIQUE KEY {} (`migration`)\n) ENGINE=InnoDB",
            quote_identifier(table),
            quote_identifier(&format!("{}_migration_unique", table)),
        );
        self.db.execute(&sql).await?;
        Ok(())
    }

    /// Tracking rows ordered by batch, then id
    pub async fn applied_migrations(&self) -> SchemaResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT `migration`, `batch`, DATE_FORMAT(`ran_at`, '%Y-%m-%d %H:%i:%s') AS ran_at FROM {} ORDER BY `batch`, `migration`",
            quote_identifier(&self.manager.config().migrations_table)
        );
        let output = self.db.execute(&sql).await?;

        output
            .rows
            .iter()
            .map(|row| {
                let migration = row.require_str("migration")?;
                let batch = row.get_i64("batch").ok_or_else(|| {
                    SchemaError::Migration(format!("Tracking row for {} has no batch", migration))
                })?;
                let ran_at = row
                    .get_str("ran_at")
                    .and_then(|raw| NaiveDateTime::parse_from_str(&raw, RAN_AT_FORMAT).ok())
                    .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
                    .ok_or_else(|| {
                        SchemaError::Migration(format!("Tracking row for {} has no valid ran_at", migration))
                    })?;
                Ok(MigrationRecord {
                    migration,
                    batch,
                    ran_at,
                })
            })
            .collect()
    }

    async fn applied_ids(&self) -> SchemaResult<HashMap<String, i64>> {
        Ok(self
            .applied_migrations()
            .await?
            .into_iter()
            .map(|r| (r.migration, r.batch))
            .collect())
    }

    async fn tracking_table_exists(&self) -> SchemaResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {}",
            quote_literal(&self.manager.config().migrations_table)
        );
        let output = self.db.execute(&sql).await?;
        Ok(output.first().and_then(|row| row.get_i64("n")).unwrap_or(0) > 0)
    }

    async fn next_batch_number(&self) -> SchemaResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(`batch`), 0) AS batch FROM {}",
            quote_identifier(&self.manager.config().migrations_table)
        );
        let output = self.db.execute(&sql).await?;
        Ok(output.first().and_then(|row| row.get_i64("batch")).unwrap_or(0) + 1)
    }

    async fn record(&self, id: &str, batch: i64) -> SchemaResult<()> {
        let sql = format!(
            "INSERT INTO {} (`migration`, `batch`, `ran_at`) VALUES ({}, {}, {})",
            quote_identifier(&self.manager.config().migrations_table),
            quote_literal(id),
            batch,
            quote_literal(&Utc::now().format(RAN_AT_FORMAT).to_string()),
        );
        self.db.execute(&sql).await?;
        Ok(())
    }

    pub(super) async fn forget(&self, id: &str) -> SchemaResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE `migration` = {}",
            quote_identifier(&self.manager.config().migrations_table),
            quote_literal(id)
        );
        self.db.execute(&sql).await?;
        Ok(())
    }

    /// Execute one direction of a migration, stopping at the first failure
    pub(super) async fn execute_statements(
        &self,
        migration: &Migration,
        direction: MigrationDirection,
    ) -> SchemaResult<()> {
        for statement in migration.statements(direction) {
            tracing::debug!("{}: {}", migration.id, statement);
            if let Err(e) = self.db.execute(statement).await {
                tracing::error!("Migration {} failed: {}", migration.id, e);
                return Err(SchemaError::StatementFailed {
                    context: format!("migration {}", migration.id),
                    statement: statement.clone(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }
}
