//! Schema Differ - computes ordered change lists
//!
//! Two comparisons are supported:
//!
//! * desired-vs-live ([`SchemaDiffer::diff_desired`]): a parsed model against
//!   the live table. Renames are resolved before anything else, columns are
//!   only dropped when explicitly marked, and indexes/foreign keys are matched
//!   by shape rather than by name.
//! * snapshot ([`SchemaDiffer::diff`]): a pure structural diff between two
//!   stored schemas, used to generate versioned migrations.
//!
//! Emitted order: foreign key drops, index drops, primary key release (only
//! when a key column is dropped), column drops, renames and modifications (a
//! rename directly before its own modify, moves included), column adds,
//! primary key, index adds, check changes, foreign key adds, table options.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::annotation::ModelSchema;
use crate::change::{apply_all, SchemaChange};
use crate::error::{SchemaError, SchemaResult};
use crate::table::{CheckConstraint, Column, ColumnPosition, PartitionSpec, TableSchema};

/// A partition layout change that ALTER cannot express
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionChange {
    pub from: Option<PartitionSpec>,
    pub to: Option<PartitionSpec>,
}

/// What an update would do that the caller may want to confirm first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChangeReport {
    pub table: String,
    /// (old, new) column names
    pub renames: Vec<(String, String)>,
    pub dropped_columns: Vec<String>,
    pub dropped_indexes: Vec<String>,
    pub dropped_foreign_keys: Vec<String>,
    /// Partitioning differs; run the table transformer for it
    pub requires_transform: Option<PartitionChange>,
}

impl PendingChangeReport {
    /// Whether anything here needs a human decision
    pub fn needs_confirmation(&self) -> bool {
        !self.renames.is_empty()
            || !self.dropped_columns.is_empty()
            || !self.dropped_indexes.is_empty()
            || !self.dropped_foreign_keys.is_empty()
            || self.requires_transform.is_some()
    }
}

/// Result of a desired-vs-live diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredDiff {
    pub changes: Vec<SchemaChange>,
    pub report: PendingChangeReport,
}

/// Change buckets, flattened in emission order
#[derive(Default)]
struct ChangeSet {
    fk_drops: Vec<SchemaChange>,
    index_drops: Vec<SchemaChange>,
    key_releases: Vec<SchemaChange>,
    column_drops: Vec<SchemaChange>,
    renames_and_modifies: Vec<SchemaChange>,
    column_adds: Vec<SchemaChange>,
    primary_key: Vec<SchemaChange>,
    index_adds: Vec<SchemaChange>,
    checks: Vec<SchemaChange>,
    fk_adds: Vec<SchemaChange>,
    options: Vec<SchemaChange>,
}

impl ChangeSet {
    fn into_changes(self) -> Vec<SchemaChange> {
        [
            self.fk_drops,
            self.index_drops,
            self.key_releases,
            self.column_drops,
            self.renames_and_modifies,
            self.column_adds,
            self.primary_key,
            self.index_adds,
            self.checks,
            self.fk_adds,
            self.options,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaDiffer;

impl SchemaDiffer {
    pub fn new() -> Self {
        Self
    }

    /// Diff a parsed model against the live table
    pub fn diff_desired(&self, model: &ModelSchema, live: &TableSchema) -> SchemaResult<DesiredDiff> {
        let desired = model.desired_schema()?;
        let renames = resolve_renames(model, live)?;
        let drops = resolve_drops(model, live, &renames)?;

        let mut set = ChangeSet::default();
        let mut report = PendingChangeReport {
            table: live.name.clone(),
            ..Default::default()
        };
        // Tracks the table as the emitted changes would leave it
        let mut working = live.clone();

        let mut dropped_fks = HashSet::new();
        let mut dropped_indexes = HashSet::new();
        for column in &drops {
            for fk in live.foreign_keys_on(column) {
                if dropped_fks.insert(fk.name.clone()) {
                    report.dropped_foreign_keys.push(fk.name.clone());
                    set.fk_drops.push(SchemaChange::DropForeignKey(fk.clone()));
                }
            }
            for index in live.indexes_on(column) {
                if dropped_indexes.insert(index.name.clone()) {
                    report.dropped_indexes.push(index.name.clone());
                    set.index_drops.push(SchemaChange::DropIndex(index.clone()));
                }
            }
        }

        // Foreign keys on kept columns whose target or actions changed
        for fk in desired.foreign_keys.values() {
            let live_column = renames
                .iter()
                .find(|(_, new)| new.eq_ignore_ascii_case(&fk.column))
                .map(|(old, _)| old.as_str())
                .unwrap_or(fk.column.as_str());
            for existing in live.foreign_keys_on(live_column) {
                let mut renamed = existing.clone();
                renamed.column = fk.column.clone();
                if !renamed.same_shape(fk) && dropped_fks.insert(existing.name.clone()) {
                    report.dropped_foreign_keys.push(existing.name.clone());
                    set.fk_drops.push(SchemaChange::DropForeignKey(existing.clone()));
                }
            }
        }

        for change in set.fk_drops.iter().chain(&set.index_drops) {
            change.apply_to(&mut working)?;
        }

        for column in &drops {
            let Some(existing) = working.column(column).cloned() else {
                continue;
            };
            let change = SchemaChange::DropColumn {
                position: working.position_hint(&existing.name),
                column: existing,
            };
            change.apply_to(&mut working)?;
            report.dropped_columns.push(column.clone());
            set.column_drops.push(change);
        }

        for spec in model.kept_columns() {
            let wanted = spec.to_column();
            let rename = renames
                .iter()
                .find(|(_, new)| new.eq_ignore_ascii_case(&spec.name))
                .cloned();

            if let Some((old, new)) = rename {
                let change = SchemaChange::RenameColumn { from: old.clone(), to: new.clone() };
                change.apply_to(&mut working)?;
                set.renames_and_modifies.push(change);
                report.renames.push((old, new));
            }

            match working.column(&spec.name).cloned() {
                Some(current) if !current.same_definition(&wanted) => {
                    let change = SchemaChange::ModifyColumn {
                        from: current,
                        to: Column { name: spec.name.clone(), ..wanted },
                        position: None,
                        prior_position: None,
                    };
                    change.apply_to(&mut working)?;
                    set.renames_and_modifies.push(change);
                }
                Some(_) => {}
                None => set.column_adds.push(SchemaChange::AddColumn {
                    column: wanted,
                    position: spec.position.clone(),
                }),
            }
        }
        for change in &set.column_adds {
            change.apply_to(&mut working)?;
        }

        if !desired.primary_key.is_empty() && !same_names(&desired.primary_key, &working.primary_key) {
            set.primary_key.push(SchemaChange::ModifyPrimaryKey {
                from: working.primary_key.clone(),
                to: desired.primary_key.clone(),
            });
        }

        for index in desired.indexes.values() {
            if working.indexes.values().any(|live| live.same_shape(index)) {
                continue;
            }
            if let Some(clash) = working.indexes.get(&index.name).cloned() {
                report.dropped_indexes.push(clash.name.clone());
                set.index_drops.push(SchemaChange::DropIndex(clash));
            }
            set.index_adds.push(SchemaChange::AddIndex(index.clone()));
        }

        for check in desired.checks.values() {
            match working.checks.get(&check.name) {
                Some(live) if same_check(live, check) => {}
                Some(live) => {
                    set.checks.push(SchemaChange::DropCheck(live.clone()));
                    set.checks.push(SchemaChange::AddCheck(check.clone()));
                }
                None => set.checks.push(SchemaChange::AddCheck(check.clone())),
            }
        }

        for fk in desired.foreign_keys.values() {
            let kept = working
                .foreign_keys
                .values()
                .any(|live| !dropped_fks.contains(&live.name) && live.same_shape(fk));
            if !kept {
                set.fk_adds.push(SchemaChange::AddForeignKey(fk.clone()));
            }
        }

        if !live.options.satisfies(&desired.options) {
            set.options.push(SchemaChange::ModifyTableOptions {
                from: live.options.clone(),
                to: desired.options.clone(),
            });
        }

        if desired.partition.is_some() && !same_partition(&live.partition, &desired.partition) {
            report.requires_transform = Some(PartitionChange {
                from: live.partition.clone(),
                to: desired.partition.clone(),
            });
        }

        let changes = set.into_changes();
        // Fails on position hints or keys that name missing columns
        apply_all(live, &changes)?;

        tracing::debug!(
            "Diffed model {} against '{}': {} change(s)",
            model.model,
            live.name,
            changes.len()
        );
        Ok(DesiredDiff { changes, report })
    }

    /// Structural diff between two stored schemas
    pub fn diff(&self, from: &TableSchema, to: &TableSchema) -> SchemaResult<Vec<SchemaChange>> {
        from.validate()?;
        to.validate()?;

        if !same_partition(&from.partition, &to.partition) {
            return Err(SchemaError::SchemaMismatch(format!(
                "Partitioning of '{}' differs between schemas; use a table transform",
                to.name
            )));
        }

        let mut set = ChangeSet::default();

        for fk in from.foreign_keys.values() {
            if to.foreign_keys.get(&fk.name) != Some(fk) {
                set.fk_drops.push(SchemaChange::DropForeignKey(fk.clone()));
            }
        }
        for fk in to.foreign_keys.values() {
            if from.foreign_keys.get(&fk.name) != Some(fk) {
                set.fk_adds.push(SchemaChange::AddForeignKey(fk.clone()));
            }
        }

        for index in from.indexes.values() {
            match to.indexes.get(&index.name) {
                Some(target) if target.same_shape(index) => {}
                _ => set.index_drops.push(SchemaChange::DropIndex(index.clone())),
            }
        }
        for index in to.indexes.values() {
            match from.indexes.get(&index.name) {
                Some(source) if source.same_shape(index) => {}
                _ => set.index_adds.push(SchemaChange::AddIndex(index.clone())),
            }
        }

        for check in from.checks.values() {
            match to.checks.get(&check.name) {
                Some(target) if same_check(target, check) => {}
                _ => set.checks.push(SchemaChange::DropCheck(check.clone())),
            }
        }
        for check in to.checks.values() {
            match from.checks.get(&check.name) {
                Some(source) if same_check(source, check) => {}
                _ => set.checks.push(SchemaChange::AddCheck(check.clone())),
            }
        }

        // Tracks the table as the emitted changes would leave it
        let mut working = from.clone();
        for change in set.fk_drops.iter().chain(&set.index_drops) {
            change.apply_to(&mut working)?;
        }

        // A dropped key column takes the key with it: release the key before
        // the drops, the target key is added after the column adds
        if from.primary_key.iter().any(|key| !to.has_column(key)) {
            for key in &from.primary_key {
                let Some(column) = working.column(key).cloned() else {
                    continue;
                };
                if column.auto_increment && !to.has_column(key) {
                    let change = SchemaChange::ModifyColumn {
                        to: Column { auto_increment: false, ..column.clone() },
                        from: column,
                        position: None,
                        prior_position: None,
                    };
                    change.apply_to(&mut working)?;
                    set.key_releases.push(change);
                }
            }
            let change = SchemaChange::ModifyPrimaryKey {
                from: from.primary_key.clone(),
                to: Vec::new(),
            };
            change.apply_to(&mut working)?;
            set.key_releases.push(change);
        }

        for column in &from.columns {
            if to.has_column(&column.name) {
                continue;
            }
            let Some(current) = working.column(&column.name).cloned() else {
                continue;
            };
            let change = SchemaChange::DropColumn {
                position: working.position_hint(&current.name),
                column: current,
            };
            change.apply_to(&mut working)?;
            set.column_drops.push(change);
        }

        // Shared columns are laid out in target order: the first `slot`
        // columns of `working` always match the target prefix
        let mut slot = 0;
        let mut placed: Option<String> = None;
        for column in &to.columns {
            let Some(source) = working.column(&column.name).cloned() else {
                set.column_adds.push(SchemaChange::AddColumn {
                    column: column.clone(),
                    position: to.position_hint(&column.name),
                });
                continue;
            };

            let in_place = working
                .columns
                .get(slot)
                .is_some_and(|c| c.name.eq_ignore_ascii_case(&column.name));
            let (position, prior_position) = if in_place {
                (None, None)
            } else {
                let target = match &placed {
                    None => ColumnPosition::First,
                    Some(previous) => ColumnPosition::After(previous.clone()),
                };
                (Some(target), working.position_hint(&column.name))
            };

            if position.is_some() || !source.same_definition(column) {
                let change = SchemaChange::ModifyColumn {
                    from: source,
                    to: column.clone(),
                    position,
                    prior_position,
                };
                change.apply_to(&mut working)?;
                set.renames_and_modifies.push(change);
            }
            placed = Some(column.name.clone());
            slot += 1;
        }
        for change in &set.column_adds {
            change.apply_to(&mut working)?;
        }

        if !same_names(&working.primary_key, &to.primary_key) {
            set.primary_key.push(SchemaChange::ModifyPrimaryKey {
                from: working.primary_key.clone(),
                to: to.primary_key.clone(),
            });
        }

        if !from.options.satisfies(&to.options) {
            set.options.push(SchemaChange::ModifyTableOptions {
                from: from.options.clone(),
                to: to.options.clone(),
            });
        }

        Ok(set.into_changes())
    }
}

/// Validate rename markers against the live table; returns (old, new) pairs
fn resolve_renames(model: &ModelSchema, live: &TableSchema) -> SchemaResult<Vec<(String, String)>> {
    let mut renames: Vec<(String, String)> = Vec::new();

    for spec in model.kept_columns() {
        let Some(old) = &spec.rename_from else {
            continue;
        };

        if renames.iter().any(|(claimed, _)| claimed.eq_ignore_ascii_case(old)) {
            return Err(SchemaError::MigrationConflict(format!(
                "Column '{}' is renamed by more than one field",
                old
            )));
        }
        if model
            .kept_columns()
            .any(|other| other.name.eq_ignore_ascii_case(old))
        {
            return Err(SchemaError::MigrationConflict(format!(
                "Column '{}' is renamed to '{}' but is also declared as a column",
                old, spec.name
            )));
        }

        match (live.has_column(old), live.has_column(&spec.name)) {
            (true, true) => {
                return Err(SchemaError::MigrationConflict(format!(
                    "Cannot rename '{}' to '{}' in '{}': both columns exist",
                    old, spec.name, live.name
                )));
            }
            (true, false) => renames.push((old.clone(), spec.name.clone())),
            (false, true) => {
                tracing::debug!("Rename {} -> {} already applied", old, spec.name);
            }
            (false, false) => {
                tracing::warn!(
                    "Rename source '{}' not found in '{}'; '{}' will be added",
                    old,
                    live.name,
                    spec.name
                );
            }
        }
    }
    Ok(renames)
}

/// Live columns explicitly marked for removal
fn resolve_drops(
    model: &ModelSchema,
    live: &TableSchema,
    renames: &[(String, String)],
) -> SchemaResult<Vec<String>> {
    let mut drops = Vec::new();
    for spec in model.dropped_columns() {
        let claimed = model.kept_columns().any(|c| {
            c.rename_from
                .as_deref()
                .is_some_and(|old| old.eq_ignore_ascii_case(&spec.name))
        }) || renames.iter().any(|(old, _)| old.eq_ignore_ascii_case(&spec.name));
        if claimed {
            return Err(SchemaError::MigrationConflict(format!(
                "Column '{}' is marked for drop but claimed by a rename",
                spec.name
            )));
        }
        match live.column(&spec.name) {
            Some(column) => drops.push(column.name.clone()),
            None => tracing::warn!(
                "Column '{}' marked for drop does not exist in '{}'",
                spec.name,
                live.name
            ),
        }
    }
    Ok(drops)
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

fn same_partition(a: &Option<PartitionSpec>, b: &Option<PartitionSpec>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.kind == b.kind && a.count == b.count && a.column.eq_ignore_ascii_case(&b.column)
        }
        _ => false,
    }
}

fn same_check(a: &CheckConstraint, b: &CheckConstraint) -> bool {
    normalize_expression(&a.expression) == normalize_expression(&b.expression)
}

/// Engines wrap stored check expressions in extra parentheses and quote
/// identifiers; compare without either
fn normalize_expression(expression: &str) -> String {
    let mut text: String = expression
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '`')
        .collect::<String>()
        .to_ascii_lowercase();
    while text.starts_with('(') && text.ends_with(')') && wraps_whole(&text) {
        text = text[1..text.len() - 1].to_string();
    }
    text
}

/// Whether the first `(` closes at the very end
fn wraps_whole(text: &str) -> bool {
    let mut depth = 0i32;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationParser, ModelDescriptor};
    use crate::table::{ColumnPosition, ForeignKeyDefinition, IndexDefinition, ReferentialAction};

    fn live_users() -> TableSchema {
        TableSchema::new("users")
            .with_column(Column::new("id", "INT(10)").unsigned().auto_increment())
            .with_column(Column::new("name", "VARCHAR(100)"))
            .with_column(Column::new("team_id", "INT(10)").unsigned().nullable())
            .with_primary_key(&["id"])
            .with_index(IndexDefinition::new("users_team_id_index", &["team_id"]))
            .with_foreign_key(ForeignKeyDefinition {
                name: "users_team_id_foreign".to_string(),
                column: "team_id".to_string(),
                ref_table: "teams".to_string(),
                ref_column: "id".to_string(),
                on_delete: ReferentialAction::Restrict,
                on_update: ReferentialAction::Restrict,
            })
    }

    fn parse(model: ModelDescriptor) -> ModelSchema {
        AnnotationParser::new().parse_model(&model).unwrap()
    }

    #[test]
    fn test_identical_model_yields_nothing() {
        let model = parse(
            ModelDescriptor::new("User")
                .field("id", "@increments")
                .field("name", "@varchar 100")
                .field("team_id", "@int 10 @unsigned @nullable @index @foreign teams(id)"),
        );
        let diff = SchemaDiffer::new().diff_desired(&model, &live_users()).unwrap();
        assert!(diff.changes.is_empty(), "{:?}", diff.changes);
        assert!(!diff.report.needs_confirmation());
    }

    #[test]
    fn test_silence_never_drops() {
        let model = parse(ModelDescriptor::new("User").field("id", "@increments"));
        let diff = SchemaDiffer::new().diff_desired(&model, &live_users()).unwrap();
        assert!(diff.changes.iter().all(|c| !c.is_destructive()));
    }

    #[test]
    fn test_rename_then_modify() {
        let model = parse(
            ModelDescriptor::new("User")
                .field("id", "@increments")
                .field("full_name", "@varchar 200 @renamed name"),
        );
        let diff = SchemaDiffer::new().diff_desired(&model, &live_users()).unwrap();

        assert_eq!(diff.changes.len(), 2);
        assert_eq!(
            diff.changes[0],
            SchemaChange::RenameColumn {
                from: "name".to_string(),
                to: "full_name".to_string()
            }
        );
        match &diff.changes[1] {
            SchemaChange::ModifyColumn { from, to, .. } => {
                assert_eq!(from.name, "full_name");
                assert_eq!(from.sql_type, "VARCHAR(100)");
                assert_eq!(to.sql_type, "VARCHAR(200)");
            }
            other => panic!("expected modify, got {:?}", other),
        }
        assert_eq!(diff.report.renames, vec![("name".to_string(), "full_name".to_string())]);
    }

    #[test]
    fn test_drop_marker_drops_constraints_first() {
        let model = parse(
            ModelDescriptor::new("User")
                .field("id", "@increments")
                .field("team_id", "@drop"),
        );
        let diff = SchemaDiffer::new().diff_desired(&model, &live_users()).unwrap();

        let kinds: Vec<String> = diff.changes.iter().map(SchemaChange::describe).collect();
        assert_eq!(
            kinds,
            vec![
                "drop foreign key users_team_id_foreign",
                "drop index users_team_id_index",
                "drop column team_id",
            ]
        );
        match &diff.changes[2] {
            SchemaChange::DropColumn { position, .. } => {
                assert_eq!(position, &Some(ColumnPosition::After("name".to_string())))
            }
            other => panic!("expected drop, got {:?}", other),
        }
        assert_eq!(diff.report.dropped_columns, vec!["team_id"]);
    }

    #[test]
    fn test_changed_foreign_key_is_replaced() {
        let model = parse(
            ModelDescriptor::new("User")
                .field("team_id", "@int 10 @unsigned @nullable @foreign teams(id) @ondelete cascade"),
        );
        let diff = SchemaDiffer::new().diff_desired(&model, &live_users()).unwrap();
        let kinds: Vec<String> = diff.changes.iter().map(SchemaChange::describe).collect();
        assert_eq!(
            kinds,
            vec![
                "drop foreign key users_team_id_foreign",
                "add foreign key users_team_id_foreign",
            ]
        );
    }

    #[test]
    fn test_rename_conflicts() {
        let differ = SchemaDiffer::new();
        let live = live_users().with_column(Column::new("full_name", "VARCHAR(100)"));

        let both_exist = parse(ModelDescriptor::new("User").field("full_name", "@varchar 100 @renamed name"));
        assert!(matches!(
            differ.diff_desired(&both_exist, &live),
            Err(SchemaError::MigrationConflict(_))
        ));

        let twice = parse(
            ModelDescriptor::new("User")
                .field("a", "@varchar @renamed name")
                .field("b", "@varchar @renamed name"),
        );
        assert!(matches!(
            differ.diff_desired(&twice, &live_users()),
            Err(SchemaError::MigrationConflict(_))
        ));

        let source_kept = parse(
            ModelDescriptor::new("User")
                .field("name", "@varchar 100")
                .field("title", "@varchar @renamed name"),
        );
        assert!(matches!(
            differ.diff_desired(&source_kept, &live_users()),
            Err(SchemaError::MigrationConflict(_))
        ));

        let drop_claimed = parse(
            ModelDescriptor::new("User")
                .field("title", "@varchar @renamed name")
                .field("name", "@drop"),
        );
        assert!(matches!(
            differ.diff_desired(&drop_claimed, &live_users()),
            Err(SchemaError::MigrationConflict(_))
        ));
    }

    #[test]
    fn test_partition_divergence_is_reported() {
        let model = parse(
            ModelDescriptor::new("User")
                .doc("@partition hash(id) 4")
                .field("id", "@increments"),
        );
        let diff = SchemaDiffer::new().diff_desired(&model, &live_users()).unwrap();
        assert!(diff.changes.is_empty());
        let change = diff.report.requires_transform.unwrap();
        assert!(change.from.is_none());
        assert_eq!(change.to.unwrap().count, 4);
    }

    #[test]
    fn test_snapshot_diff_positions_and_partition_mismatch() {
        let from = TableSchema::new("t")
            .with_column(Column::new("id", "INT(11)"))
            .with_column(Column::new("b", "INT(11)"));
        let to = TableSchema::new("t")
            .with_column(Column::new("a", "INT(11)"))
            .with_column(Column::new("id", "INT(11)"))
            .with_column(Column::new("c", "INT(11)"));

        let changes = SchemaDiffer::new().diff(&from, &to).unwrap();
        assert_eq!(
            changes,
            vec![
                SchemaChange::DropColumn {
                    column: Column::new("b", "INT(11)"),
                    position: Some(ColumnPosition::After("id".to_string())),
                },
                SchemaChange::AddColumn {
                    column: Column::new("a", "INT(11)"),
                    position: Some(ColumnPosition::First),
                },
                SchemaChange::AddColumn {
                    column: Column::new("c", "INT(11)"),
                    position: Some(ColumnPosition::After("id".to_string())),
                },
            ]
        );

        let mut partitioned = to.clone();
        partitioned.partition = Some(PartitionSpec {
            kind: crate::table::PartitionKind::Key,
            column: "id".to_string(),
            count: 2,
        });
        assert!(matches!(
            SchemaDiffer::new().diff(&to, &partitioned),
            Err(SchemaError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_check_expressions_compare_normalized() {
        let a = CheckConstraint {
            name: "c".to_string(),
            expression: "`score` >= 0".to_string(),
        };
        let b = CheckConstraint {
            name: "c".to_string(),
            expression: "((score >= 0))".to_string(),
        };
        assert!(same_check(&a, &b));
        assert_eq!(normalize_expression("(a > 0) and (b > 0)"), "(a>0)and(b>0)");
    }
}
