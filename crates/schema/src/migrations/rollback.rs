//! Migration Rollback - Reverting applied batches
//!
//! Rollback works in batches: the last `n` batches are reverted newest
//! migration first. A tracking row is removed only after the migration's
//! DOWN statements all succeeded.

use std::collections::BTreeSet;
use std::time::Instant;

use super::definitions::{MigrationDirection, MigrationRecord, RollbackResult};
use super::runner::MigrationRunner;
use crate::error::{SchemaError, SchemaResult};

impl MigrationRunner {
    /// Revert the last `steps` batches
    #[tracing::instrument(skip(self))]
    pub async fn rollback(&self, steps: usize) -> SchemaResult<RollbackResult> {
        self.ensure_migrations_table().await?;
        let records = self.applied_migrations().await?;

        let batches: BTreeSet<i64> = records.iter().map(|r| r.batch).collect();
        let targets: BTreeSet<i64> = batches.into_iter().rev().take(steps).collect();

        let selected = records
            .into_iter()
            .filter(|r| targets.contains(&r.batch))
            .collect();
        self.rollback_records(selected).await
    }

    /// Revert every applied migration
    pub async fn reset(&self) -> SchemaResult<RollbackResult> {
        self.rollback(usize::MAX).await
    }

    async fn rollback_records(&self, mut records: Vec<MigrationRecord>) -> SchemaResult<RollbackResult> {
        let start_time = Instant::now();
        let mut result = RollbackResult::default();

        if records.is_empty() {
            tracing::info!("Nothing to roll back");
            return Ok(result);
        }

        records.sort_by(|a, b| {
            b.batch
                .cmp(&a.batch)
                .then_with(|| b.migration.cmp(&a.migration))
        });

        let migrations = self.manager().load_migrations().await?;
        for record in &records {
            let migration = migrations
                .iter()
                .find(|m| m.id == record.migration)
                .ok_or_else(|| {
                    SchemaError::Migration(format!(
                        "Cannot roll back {}: migration file not found",
                        record.migration
                    ))
                })?;

            tracing::info!("Rolling back: {}", migration.id);
            self.execute_statements(migration, MigrationDirection::Down)
                .await?;
            self.forget(&migration.id).await?;
            tracing::info!("Rolled back: {}", migration.id);
            result.rolled_back.push(migration.id.clone());
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }
}
