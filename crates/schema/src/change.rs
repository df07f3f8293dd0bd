//! Schema changes
//!
//! One [`SchemaChange`] is one atomic structural difference between two
//! table schemas. Every variant carries enough of the prior state to be
//! inverted, so a change list always has an exact DOWN counterpart.

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::table::{
    CheckConstraint, Column, ColumnPosition, ForeignKeyDefinition, IndexDefinition, TableOptions,
    TableSchema,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SchemaChange {
    AddColumn {
        column: Column,
        position: Option<ColumnPosition>,
    },
    /// `column` is the definition being removed, `position` where it sat
    DropColumn {
        column: Column,
        position: Option<ColumnPosition>,
    },
    RenameColumn {
        from: String,
        to: String,
    },
    /// Both definitions carry the column's current name. `position` moves
    /// the column, `prior_position` is where it sat before the move.
    ModifyColumn {
        from: Column,
        to: Column,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<ColumnPosition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prior_position: Option<ColumnPosition>,
    },
    AddIndex(IndexDefinition),
    DropIndex(IndexDefinition),
    AddForeignKey(ForeignKeyDefinition),
    DropForeignKey(ForeignKeyDefinition),
    AddCheck(CheckConstraint),
    DropCheck(CheckConstraint),
    ModifyPrimaryKey {
        from: Vec<String>,
        to: Vec<String>,
    },
    ModifyTableOptions {
        from: TableOptions,
        to: TableOptions,
    },
}

impl SchemaChange {
    /// The change that undoes this one
    pub fn inverse(&self) -> SchemaChange {
        match self.clone() {
            SchemaChange::AddColumn { column, position } => {
                SchemaChange::DropColumn { column, position }
            }
            SchemaChange::DropColumn { column, position } => {
                SchemaChange::AddColumn { column, position }
            }
            SchemaChange::RenameColumn { from, to } => SchemaChange::RenameColumn { from: to, to: from },
            SchemaChange::ModifyColumn {
                from,
                to,
                position,
                prior_position,
            } => SchemaChange::ModifyColumn {
                from: to,
                to: from,
                position: prior_position,
                prior_position: position,
            },
            SchemaChange::AddIndex(index) => SchemaChange::DropIndex(index),
            SchemaChange::DropIndex(index) => SchemaChange::AddIndex(index),
            SchemaChange::AddForeignKey(fk) => SchemaChange::DropForeignKey(fk),
            SchemaChange::DropForeignKey(fk) => SchemaChange::AddForeignKey(fk),
            SchemaChange::AddCheck(check) => SchemaChange::DropCheck(check),
            SchemaChange::DropCheck(check) => SchemaChange::AddCheck(check),
            SchemaChange::ModifyPrimaryKey { from, to } => SchemaChange::ModifyPrimaryKey { from: to, to: from },
            SchemaChange::ModifyTableOptions { from, to } => {
                SchemaChange::ModifyTableOptions { from: to, to: from }
            }
        }
    }

    /// Short human description, used in reports and logs
    pub fn describe(&self) -> String {
        match self {
            SchemaChange::AddColumn { column, .. } => format!("add column {}", column.name),
            SchemaChange::DropColumn { column, .. } => format!("drop column {}", column.name),
            SchemaChange::RenameColumn { from, to } => format!("rename column {} to {}", from, to),
            SchemaChange::ModifyColumn { to, .. } => format!("modify column {}", to.name),
            SchemaChange::AddIndex(index) => format!("add index {}", index.name),
            SchemaChange::DropIndex(index) => format!("drop index {}", index.name),
            SchemaChange::AddForeignKey(fk) => format!("add foreign key {}", fk.name),
            SchemaChange::DropForeignKey(fk) => format!("drop foreign key {}", fk.name),
            SchemaChange::AddCheck(check) => format!("add check {}", check.name),
            SchemaChange::DropCheck(check) => format!("drop check {}", check.name),
            SchemaChange::ModifyPrimaryKey { to, .. } => format!("primary key ({})", to.join(", ")),
            SchemaChange::ModifyTableOptions { .. } => "table options".to_string(),
        }
    }

    /// Whether this change removes a column, index or foreign key
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            SchemaChange::DropColumn { .. }
                | SchemaChange::DropIndex(_)
                | SchemaChange::DropForeignKey(_)
                | SchemaChange::DropCheck(_)
        )
    }

    /// Apply the change to an in-memory schema, as the engine would
    ///
    /// Renames carry over to key, index and foreign key column lists.
    pub fn apply_to(&self, schema: &mut TableSchema) -> SchemaResult<()> {
        let table = schema.name.clone();
        let missing = |what: &str, name: &str| {
            SchemaError::SchemaMismatch(format!("{} '{}' not found in '{}'", what, name, table))
        };

        match self {
            SchemaChange::AddColumn { column, position } => {
                if schema.has_column(&column.name) {
                    return Err(SchemaError::SchemaMismatch(format!(
                        "Column '{}' already exists in '{}'",
                        column.name, schema.name
                    )));
                }
                let index = match position {
                    None => schema.columns.len(),
                    Some(position) => insert_index(schema, position)
                        .ok_or_else(|| missing("Column", &column.name))?,
                };
                schema.columns.insert(index, column.clone());
            }
            SchemaChange::DropColumn { column, .. } => {
                let index = schema
                    .position_of(&column.name)
                    .ok_or_else(|| missing("Column", &column.name))?;
                schema.columns.remove(index);
                // The engine takes the column out of the primary key with it
                schema
                    .primary_key
                    .retain(|key| !key.eq_ignore_ascii_case(&column.name));
            }
            SchemaChange::RenameColumn { from, to } => {
                let column = schema.column_mut(from).ok_or_else(|| missing("Column", from))?;
                column.name = to.clone();
                let rename = |col: &mut String| {
                    if col.eq_ignore_ascii_case(from) {
                        *col = to.clone();
                    }
                };
                schema.primary_key.iter_mut().for_each(rename);
                for index in schema.indexes.values_mut() {
                    index.columns.iter_mut().for_each(rename);
                }
                for fk in schema.foreign_keys.values_mut() {
                    rename(&mut fk.column);
                }
                if let Some(partition) = schema.partition.as_mut() {
                    rename(&mut partition.column);
                }
            }
            SchemaChange::ModifyColumn { to, position, .. } => {
                let index = schema.position_of(&to.name).ok_or_else(|| missing("Column", &to.name))?;
                match position {
                    None => schema.columns[index] = to.clone(),
                    Some(position) => {
                        if let ColumnPosition::After(after) = position {
                            if after.eq_ignore_ascii_case(&to.name) || !schema.has_column(after) {
                                return Err(missing("Column", after));
                            }
                        }
                        schema.columns.remove(index);
                        let target = insert_index(schema, position)
                            .ok_or_else(|| missing("Column", &to.name))?;
                        schema.columns.insert(target, to.clone());
                    }
                }
            }
            SchemaChange::AddIndex(index) => {
                schema.indexes.insert(index.name.clone(), index.clone());
            }
            SchemaChange::DropIndex(index) => {
                schema
                    .indexes
                    .remove(&index.name)
                    .ok_or_else(|| missing("Index", &index.name))?;
            }
            SchemaChange::AddForeignKey(fk) => {
                schema.foreign_keys.insert(fk.name.clone(), fk.clone());
            }
            SchemaChange::DropForeignKey(fk) => {
                schema
                    .foreign_keys
                    .remove(&fk.name)
                    .ok_or_else(|| missing("Foreign key", &fk.name))?;
            }
            SchemaChange::AddCheck(check) => {
                schema.checks.insert(check.name.clone(), check.clone());
            }
            SchemaChange::DropCheck(check) => {
                schema
                    .checks
                    .remove(&check.name)
                    .ok_or_else(|| missing("Check", &check.name))?;
            }
            SchemaChange::ModifyPrimaryKey { to, .. } => {
                schema.primary_key = to.clone();
            }
            SchemaChange::ModifyTableOptions { to, .. } => {
                let options = &mut schema.options;
                if to.engine.is_some() {
                    options.engine = to.engine.clone();
                }
                if to.charset.is_some() {
                    options.charset = to.charset.clone();
                }
                if to.collation.is_some() {
                    options.collation = to.collation.clone();
                }
                if to.comment.is_some() {
                    options.comment = to.comment.clone();
                }
            }
        }
        Ok(())
    }
}

/// Where a column placed at `position` lands; `None` if the anchor is missing
fn insert_index(schema: &TableSchema, position: &ColumnPosition) -> Option<usize> {
    match position {
        ColumnPosition::First => Some(0),
        ColumnPosition::After(after) => schema.position_of(after).map(|index| index + 1),
    }
}

/// The DOWN list of a change list: reversed, each change inverted
pub fn invert_all(changes: &[SchemaChange]) -> Vec<SchemaChange> {
    changes.iter().rev().map(SchemaChange::inverse).collect()
}

/// Apply a change list to a copy of `schema`
pub fn apply_all(schema: &TableSchema, changes: &[SchemaChange]) -> SchemaResult<TableSchema> {
    let mut result = schema.clone();
    for change in changes {
        change.apply_to(&mut result)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .with_column(Column::new("id", "INT(10)").unsigned().auto_increment())
            .with_column(Column::new("name", "VARCHAR(100)"))
            .with_primary_key(&["id"])
            .with_index(IndexDefinition::new("users_name_index", &["name"]))
    }

    #[test]
    fn test_inverse_is_involution() {
        let change = SchemaChange::ModifyColumn {
            from: Column::new("name", "VARCHAR(100)"),
            to: Column::new("name", "VARCHAR(200)").nullable(),
            position: Some(ColumnPosition::First),
            prior_position: Some(ColumnPosition::After("id".to_string())),
        };
        assert_eq!(change.inverse().inverse(), change);
        assert!(SchemaChange::DropIndex(IndexDefinition::new("i", &["a"])).is_destructive());
    }

    #[test]
    fn test_rename_updates_index_columns() {
        let mut schema = users();
        SchemaChange::RenameColumn {
            from: "name".to_string(),
            to: "full_name".to_string(),
        }
        .apply_to(&mut schema)
        .unwrap();

        assert_eq!(schema.column_names(), vec!["id", "full_name"]);
        assert_eq!(schema.indexes["users_name_index"].columns, vec!["full_name"]);
    }

    #[test]
    fn test_add_then_invert_restores() {
        let original = users();
        let changes = vec![
            SchemaChange::AddColumn {
                column: Column::new("email", "VARCHAR(255)").nullable(),
                position: Some(ColumnPosition::After("id".to_string())),
            },
            SchemaChange::AddIndex(IndexDefinition::new("users_email_unique", &["email"]).unique()),
        ];

        let upgraded = apply_all(&original, &changes).unwrap();
        assert_eq!(upgraded.column_names(), vec!["id", "email", "name"]);

        let restored = apply_all(&upgraded, &invert_all(&changes)).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_missing_targets_are_reported() {
        let mut schema = users();
        let err = SchemaChange::DropIndex(IndexDefinition::new("nope", &["name"]))
            .apply_to(&mut schema)
            .unwrap_err();
        assert!(matches!(err, SchemaError::SchemaMismatch(_)));
    }

    #[test]
    fn test_move_column_and_back() {
        let original = users().with_column(Column::new("email", "VARCHAR(255)"));
        let change = SchemaChange::ModifyColumn {
            from: Column::new("email", "VARCHAR(255)"),
            to: Column::new("email", "VARCHAR(255)"),
            position: Some(ColumnPosition::After("id".to_string())),
            prior_position: Some(ColumnPosition::After("name".to_string())),
        };

        let moved = apply_all(&original, &[change.clone()]).unwrap();
        assert_eq!(moved.column_names(), vec!["id", "email", "name"]);

        let restored = apply_all(&moved, &[change.inverse()]).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_drop_column_leaves_primary_key() {
        let mut schema = TableSchema::new("codes")
            .with_column(Column::new("code", "CHAR(8)"))
            .with_column(Column::new("region", "CHAR(2)"))
            .with_primary_key(&["code", "region"]);
        SchemaChange::DropColumn {
            column: Column::new("region", "CHAR(2)"),
            position: None,
        }
        .apply_to(&mut schema)
        .unwrap();
        assert_eq!(schema.primary_key, vec!["code"]);
    }

    #[test]
    fn test_serialized_tag() {
        let change = SchemaChange::RenameColumn {
            from: "a".to_string(),
            to: "b".to_string(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["change"], "rename_column");
    }
}
