//! Table Transformer - copy-swap rewrites
//!
//! Changes that ALTER cannot express in place (adding or removing a
//! partition clause) are done by building a shadow table with the new
//! definition, copying rows across in primary-key batches, and swapping the
//! two with one atomic `RENAME TABLE`.
//!
//! ```text
//! Planning -> CreatingShadow -> CopyingBatches -> Swapping -> DroppingOld -> Done
//!     \______________\________________\
//!                                      -> Cleanup (shadow dropped, source untouched)
//! ```
//!
//! Failures before the swap are cleaned up automatically. Failures at or
//! after the swap are reported for manual intervention and never retried.
//! The copy is a best-effort snapshot: writes to the source during the copy
//! are not captured.

mod options;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::backends::{quote_identifier, Database, DatabaseValue};
use crate::ddl::DdlGenerator;
use crate::error::{SchemaError, SchemaResult};
use crate::reader::SchemaReader;
use crate::table::{CheckConstraint, PartitionSpec, TableSchema};

pub use options::TransformOptions;

/// Stages of a copy-swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformState {
    Planning,
    CreatingShadow,
    CopyingBatches,
    Swapping,
    DroppingOld,
    Done,
    Cleanup,
}

impl TransformState {
    /// Whether the source table has already been replaced
    pub fn is_past_swap(&self) -> bool {
        matches!(
            self,
            TransformState::Swapping | TransformState::DroppingOld | TransformState::Done
        )
    }
}

impl fmt::Display for TransformState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformState::Planning => "planning",
            TransformState::CreatingShadow => "creating shadow table",
            TransformState::CopyingBatches => "copying batches",
            TransformState::Swapping => "swapping tables",
            TransformState::DroppingOld => "dropping old table",
            TransformState::Done => "done",
            TransformState::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// What the rewrite does to the table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    Partition(PartitionSpec),
    Unpartition,
}

/// Copy progress, reported after every batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformProgress {
    pub table: String,
    pub source_rows: u64,
    pub rows_copied: u64,
    pub batches: u64,
    pub rows_per_second: f64,
}

/// Outcome of a completed rewrite
#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub table: String,
    /// Row count of the source when copying started
    pub source_rows: u64,
    pub rows_copied: u64,
    pub batches: u64,
    pub elapsed: Duration,
    pub states: Vec<TransformState>,
}

type ProgressCallback = Box<dyn Fn(&TransformProgress) + Send + Sync>;

/// Runs copy-swap rewrites
pub struct TableTransformer {
    db: Arc<dyn Database>,
    options: TransformOptions,
    progress: Option<ProgressCallback>,
    ddl: DdlGenerator,
}

/// Bookkeeping for one run
struct Run {
    table: String,
    state: TransformState,
    history: Vec<TransformState>,
    started: Instant,
}

impl Run {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            state: TransformState::Planning,
            history: vec![TransformState::Planning],
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: TransformState) {
        tracing::info!("Transform of '{}': {}", self.table, state);
        self.state = state;
        self.history.push(state);
    }

    fn abort(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::transform_aborted(self.state, reason)
    }
}

impl TableTransformer {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self::with_options(db, TransformOptions::default())
    }

    pub fn with_options(db: Arc<dyn Database>, options: TransformOptions) -> Self {
        Self {
            db,
            options,
            progress: None,
            ddl: DdlGenerator::new(),
        }
    }

    /// Called after every copied batch
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransformProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    pub fn shadow_name(&self, table: &str) -> String {
        format!("{}{}", table, self.options.shadow_suffix)
    }

    pub fn old_name(&self, table: &str) -> String {
        format!("{}{}", table, self.options.old_suffix)
    }

    /// Rewrite `table` with a partition clause
    pub async fn partition(&self, table: &str, spec: PartitionSpec) -> SchemaResult<TransformReport> {
        self.transform(table, TransformKind::Partition(spec)).await
    }

    /// Rewrite `table` without its partition clause
    pub async fn unpartition(&self, table: &str) -> SchemaResult<TransformReport> {
        self.transform(table, TransformKind::Unpartition).await
    }

    #[tracing::instrument(skip(self), fields(batch_size = self.options.batch_size))]
    pub async fn transform(&self, table: &str, kind: TransformKind) -> SchemaResult<TransformReport> {
        let mut run = Run::new(table);
        let reader = SchemaReader::new(self.db.clone());
        let shadow = self.shadow_name(table);
        let old = self.old_name(table);

        let source = reader.read(table).await?;
        let target = self.plan(&run, &reader, &source, &kind).await?;
        let primary_key = source.primary_key[0].clone();

        run.enter(TransformState::CreatingShadow);
        let create = self.ddl.create_table_named(&target, &shadow);
        if let Err(e) = self.db.execute(&create).await {
            return Err(self.cleanup(&mut run, &shadow, format!("creating shadow table failed: {}", e)).await);
        }

        run.enter(TransformState::CopyingBatches);
        let (source_rows, rows_copied, batches) =
            match self.copy_rows(&run, &reader, &source, &shadow, &primary_key).await {
                Ok(counts) => counts,
                Err(e) => return Err(self.cleanup(&mut run, &shadow, format!("copy failed: {}", e)).await),
            };
        if rows_copied != source_rows {
            tracing::warn!(
                "Copied {} row(s) into '{}' but '{}' had {} when copying started",
                rows_copied,
                shadow,
                table,
                source_rows
            );
        }

        run.enter(TransformState::Swapping);
        let swap = self.ddl.rename_tables(&[(table, old.as_str()), (shadow.as_str(), table)]);
        if let Err(e) = self.db.execute(&swap).await {
            return Err(SchemaError::manual_intervention(
                run.state,
                format!(
                    "swap failed: {}; check '{}', '{}' and '{}' by hand",
                    e, table, shadow, old
                ),
            ));
        }

        run.enter(TransformState::DroppingOld);
        if let Err(e) = self.db.execute(&self.ddl.drop_table(&old)).await {
            return Err(SchemaError::manual_intervention(
                run.state,
                format!(
                    "'{}' now holds the new definition but dropping '{}' failed: {}",
                    table, old, e
                ),
            ));
        }

        run.enter(TransformState::Done);
        let elapsed = run.started.elapsed();
        tracing::info!(
            "Transformed '{}': {} row(s) in {} batch(es), {:.1}s",
            table,
            rows_copied,
            batches,
            elapsed.as_secs_f64()
        );

        Ok(TransformReport {
            table: table.to_string(),
            source_rows,
            rows_copied,
            batches,
            elapsed,
            states: run.history,
        })
    }

    /// Drop the shadow table left by an interrupted run, and the old table
    /// when the swap already happened
    ///
    /// Returns the names of the tables dropped.
    pub async fn cleanup_leftovers(&self, table: &str) -> SchemaResult<Vec<String>> {
        let reader = SchemaReader::new(self.db.clone());
        let mut dropped = Vec::new();

        let shadow = self.shadow_name(table);
        if reader.table_exists(&shadow).await? {
            self.db.execute(&self.ddl.drop_table(&shadow)).await?;
            dropped.push(shadow);
        }

        let old = self.old_name(table);
        if reader.table_exists(&old).await? {
            if !reader.table_exists(table).await? {
                return Err(SchemaError::manual_intervention(
                    TransformState::Cleanup,
                    format!("'{}' is missing; '{}' may be the only copy of the data", table, old),
                ));
            }
            self.db.execute(&self.ddl.drop_table(&old)).await?;
            dropped.push(old);
        }

        for name in &dropped {
            tracing::info!("Dropped leftover table '{}'", name);
        }
        Ok(dropped)
    }

    /// Validate preconditions and build the target definition
    async fn plan(
        &self,
        run: &Run,
        reader: &SchemaReader,
        source: &TableSchema,
        kind: &TransformKind,
    ) -> SchemaResult<TableSchema> {
        let table = &source.name;
        for leftover in [self.shadow_name(table), self.old_name(table)] {
            if reader.table_exists(&leftover).await? {
                return Err(run.abort(format!(
                    "leftover table '{}' from an earlier run exists; clean it up first",
                    leftover
                )));
            }
        }

        if source.primary_key.len() != 1 {
            return Err(run.abort(format!(
                "'{}' needs a single-column primary key for batched copying",
                table
            )));
        }

        let mut target = source.clone();
        match kind {
            TransformKind::Partition(spec) => {
                if spec.count == 0 {
                    return Err(run.abort(format!(
                        "partitioning '{}' needs at least one partition",
                        table
                    )));
                }
                if !source.has_column(&spec.column) {
                    return Err(run.abort(format!(
                        "partition column '{}' does not exist in '{}'",
                        spec.column, table
                    )));
                }
                let missing = source.keys_missing_column(&spec.column);
                if !missing.is_empty() {
                    return Err(run.abort(format!(
                        "partition column '{}' must be part of every unique key; missing from {}",
                        spec.column,
                        missing.join(", ")
                    )));
                }
                if !source.foreign_keys.is_empty() {
                    return Err(run.abort(format!(
                        "'{}' has foreign keys, which partitioned tables cannot carry",
                        table
                    )));
                }
                let referencing = reader.referencing_foreign_keys(table).await?;
                if let Some(key) = referencing.first() {
                    return Err(run.abort(format!(
                        "'{}' is referenced by foreign key '{}' on '{}'",
                        table, key.name, key.table
                    )));
                }
                target.partition = Some(spec.clone());
            }
            TransformKind::Unpartition => {
                if source.partition.is_none() {
                    return Err(run.abort(format!("'{}' is not partitioned", table)));
                }
                target.partition = None;
            }
        }

        // Check constraint names are unique per database and the source
        // still holds its own while the shadow exists
        let mut n = 0;
        target.checks = source
            .checks
            .values()
            .map(|check| {
                let name = loop {
                    n += 1;
                    let candidate = format!("{}_chk_{}", table, n);
                    if !source.checks.contains_key(&candidate) {
                        break candidate;
                    }
                };
                (
                    name.clone(),
                    CheckConstraint {
                        name,
                        expression: check.expression.clone(),
                    },
                )
            })
            .collect();

        target
            .validate()
            .map_err(|e| run.abort(e.to_string()))?;
        Ok(target)
    }

    /// Keyset-paginated copy; returns (source rows, rows copied, batches)
    async fn copy_rows(
        &self,
        run: &Run,
        reader: &SchemaReader,
        source: &TableSchema,
        shadow: &str,
        primary_key: &str,
    ) -> SchemaResult<(u64, u64, u64)> {
        let table = quote_identifier(&source.name);
        let pk = quote_identifier(primary_key);
        let columns = source
            .columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let batch_size = self.options.batch_size.max(1);

        let source_rows = reader.row_count(&source.name).await?;
        let copy_started = Instant::now();
        let mut last_seen: Option<DatabaseValue> = None;
        let mut rows_copied = 0u64;
        let mut batches = 0u64;

        loop {
            let after = match &last_seen {
                Some(value) => format!(" WHERE {} > {}", pk, value.to_sql_literal()),
                None => String::new(),
            };
            let bounds = self
                .db
                .execute(&format!(
                    "SELECT MAX({pk}) AS upper, COUNT(*) AS n FROM \
                     (SELECT {pk} FROM {table}{after} ORDER BY {pk} LIMIT {batch_size}) AS chunk"
                ))
                .await?;
            let Some(row) = bounds.first() else {
                break;
            };
            if row.get_i64("n").unwrap_or(0) == 0 {
                break;
            }
            let upper = row
                .get("upper")
                .cloned()
                .filter(|v| !v.is_null())
                .ok_or_else(|| run.abort("batch upper bound came back NULL"))?;

            let range = match &last_seen {
                Some(value) => format!(
                    "{pk} > {} AND {pk} <= {}",
                    value.to_sql_literal(),
                    upper.to_sql_literal()
                ),
                None => format!("{pk} <= {}", upper.to_sql_literal()),
            };
            let inserted = self
                .db
                .execute(&format!(
                    "INSERT INTO {} ({columns}) SELECT {columns} FROM {table} WHERE {range}",
                    quote_identifier(shadow)
                ))
                .await?;

            rows_copied += inserted.affected;
            batches += 1;
            last_seen = Some(upper);

            let seconds = copy_started.elapsed().as_secs_f64();
            let progress = TransformProgress {
                table: source.name.clone(),
                source_rows,
                rows_copied,
                batches,
                rows_per_second: if seconds > 0.0 { rows_copied as f64 / seconds } else { 0.0 },
            };
            tracing::info!(
                "Copied batch {} of '{}': {}/{} row(s), {:.0} rows/s",
                batches,
                source.name,
                rows_copied,
                source_rows,
                progress.rows_per_second
            );
            if let Some(callback) = &self.progress {
                callback(&progress);
            }
        }

        Ok((source_rows, rows_copied, batches))
    }

    /// Drop the shadow table after a failure before the swap
    async fn cleanup(&self, run: &mut Run, shadow: &str, reason: String) -> SchemaError {
        let failed_at = run.state;
        run.enter(TransformState::Cleanup);
        match self.db.execute(&self.ddl.drop_table_if_exists(shadow)).await {
            Ok(_) => {
                tracing::warn!("Transform of '{}' rolled back: {}", run.table, reason);
                SchemaError::transform_aborted(failed_at, reason)
            }
            Err(e) => SchemaError::manual_intervention(
                failed_at,
                format!("{}; dropping shadow table '{}' also failed: {}", reason, shadow, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_and_swap_boundary() {
        assert_eq!(TransformState::CopyingBatches.to_string(), "copying batches");
        assert!(!TransformState::CopyingBatches.is_past_swap());
        assert!(TransformState::Swapping.is_past_swap());
        assert!(!TransformState::Cleanup.is_past_swap());
    }

    #[test]
    fn test_table_names_follow_suffixes() {
        let db: Arc<dyn Database> = Arc::new(crate::backends::ScriptedDatabase::new());
        let transformer = TableTransformer::with_options(
            db,
            TransformOptions {
                batch_size: 10,
                shadow_suffix: "_new".to_string(),
                old_suffix: "_prev".to_string(),
            },
        );
        assert_eq!(transformer.shadow_name("events"), "events_new");
        assert_eq!(transformer.old_name("events"), "events_prev");
    }
}
