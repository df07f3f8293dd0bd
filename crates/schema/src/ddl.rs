//! DDL Generator - renders schemas and changes as MySQL statements
//!
//! Full tables become one `CREATE TABLE`; every [`SchemaChange`] becomes one
//! `ALTER TABLE` statement, with a forward (UP) and inverse (DOWN) rendering.
//! Identifiers are backtick-quoted and literals escaped.

use crate::backends::{quote_identifier, quote_literal};
use crate::change::{invert_all, SchemaChange};
use crate::table::{
    Column, ColumnPosition, DefaultValue, ForeignKeyDefinition, IndexDefinition, IndexType,
    PartitionSpec, TableOptions, TableSchema,
};

/// Renders DDL for MySQL-compatible engines
#[derive(Debug, Clone, Copy, Default)]
pub struct DdlGenerator;

impl DdlGenerator {
    pub fn new() -> Self {
        Self
    }

    /// `CREATE TABLE` for the whole schema
    pub fn create_table(&self, schema: &TableSchema) -> String {
        self.create_table_named(schema, &schema.name)
    }

    /// `CREATE TABLE` for the schema under another name
    pub fn create_table_named(&self, schema: &TableSchema, table: &str) -> String {
        let mut lines: Vec<String> = schema
            .columns
            .iter()
            .map(|column| format!("  {}", self.column_definition(column)))
            .collect();

        if !schema.primary_key.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", column_list(&schema.primary_key)));
        }
        for index in schema.indexes.values() {
            lines.push(format!("  {}", index_clause(index, "KEY")));
        }
        for fk in schema.foreign_keys.values() {
            lines.push(format!("  {}", foreign_key_clause(fk)));
        }
        for check in schema.checks.values() {
            lines.push(format!(
                "  CONSTRAINT {} CHECK ({})",
                quote_identifier(&check.name),
                check.expression
            ));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_identifier(table),
            lines.join(",\n")
        );
        let options = table_options(&schema.options);
        if !options.is_empty() {
            sql.push(' ');
            sql.push_str(&options);
        }
        if let Some(partition) = &schema.partition {
            sql.push('\n');
            sql.push_str(&partition_clause(partition));
        }
        sql
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", quote_identifier(table))
    }

    pub fn drop_table_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(table))
    }

    /// One atomic `RENAME TABLE` for any number of pairs
    pub fn rename_tables(&self, pairs: &[(&str, &str)]) -> String {
        let renames: Vec<String> = pairs
            .iter()
            .map(|(from, to)| format!("{} TO {}", quote_identifier(from), quote_identifier(to)))
            .collect();
        format!("RENAME TABLE {}", renames.join(", "))
    }

    /// `` `name` TYPE [UNSIGNED] NULL|NOT NULL [DEFAULT ...] [AUTO_INCREMENT] [COMMENT '...'] ``
    pub fn column_definition(&self, column: &Column) -> String {
        let mut sql = format!("{} {}", quote_identifier(&column.name), column.sql_type);
        if column.unsigned {
            sql.push_str(" UNSIGNED");
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            if !column.forbids_default() {
                sql.push_str(" DEFAULT ");
                sql.push_str(&default_sql(default));
            }
        }
        if column.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        if let Some(comment) = &column.comment {
            sql.push_str(" COMMENT ");
            sql.push_str(&quote_literal(comment));
        }
        sql
    }

    /// The `ALTER TABLE` statement for one change
    ///
    /// Returns `None` only for option changes with nothing the engine can
    /// express (an option going back to unspecified).
    pub fn alter(&self, table: &str, change: &SchemaChange) -> Option<String> {
        let body = match change {
            SchemaChange::AddColumn { column, position } => format!(
                "ADD COLUMN {}{}",
                self.column_definition(column),
                position_clause(position.as_ref())
            ),
            SchemaChange::DropColumn { column, .. } => {
                format!("DROP COLUMN {}", quote_identifier(&column.name))
            }
            SchemaChange::RenameColumn { from, to } => format!(
                "RENAME COLUMN {} TO {}",
                quote_identifier(from),
                quote_identifier(to)
            ),
            SchemaChange::ModifyColumn { to, position, .. } => format!(
                "MODIFY COLUMN {}{}",
                self.column_definition(to),
                position_clause(position.as_ref())
            ),
            SchemaChange::AddIndex(index) => format!("ADD {}", index_clause(index, "INDEX")),
            SchemaChange::DropIndex(index) => format!("DROP INDEX {}", quote_identifier(&index.name)),
            SchemaChange::AddForeignKey(fk) => format!("ADD {}", foreign_key_clause(fk)),
            SchemaChange::DropForeignKey(fk) => {
                format!("DROP FOREIGN KEY {}", quote_identifier(&fk.name))
            }
            SchemaChange::AddCheck(check) => format!(
                "ADD CONSTRAINT {} CHECK ({})",
                quote_identifier(&check.name),
                check.expression
            ),
            SchemaChange::DropCheck(check) => format!("DROP CHECK {}", quote_identifier(&check.name)),
            SchemaChange::ModifyPrimaryKey { from, to } => match (from.is_empty(), to.is_empty()) {
                (true, true) => return None,
                (true, false) => format!("ADD PRIMARY KEY ({})", column_list(to)),
                (false, true) => "DROP PRIMARY KEY".to_string(),
                (false, false) => format!("DROP PRIMARY KEY, ADD PRIMARY KEY ({})", column_list(to)),
            },
            SchemaChange::ModifyTableOptions { from, to } => {
                let changed = TableOptions {
                    engine: changed_option(&from.engine, &to.engine),
                    charset: changed_option(&from.charset, &to.charset),
                    collation: changed_option(&from.collation, &to.collation),
                    comment: changed_option(&from.comment, &to.comment),
                };
                let clause = table_options(&changed);
                if clause.is_empty() {
                    return None;
                }
                clause
            }
        };
        Some(format!("ALTER TABLE {} {}", quote_identifier(table), body))
    }

    /// UP statements for a change list, one per change
    pub fn up_statements(&self, table: &str, changes: &[SchemaChange]) -> Vec<String> {
        changes
            .iter()
            .filter_map(|change| self.alter(table, change))
            .collect()
    }

    /// DOWN statements: the reversed list with every change inverted
    pub fn down_statements(&self, table: &str, changes: &[SchemaChange]) -> Vec<String> {
        self.up_statements(table, &invert_all(changes))
    }
}

fn default_sql(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Literal(value) => quote_literal(value),
        DefaultValue::Expression(expr) => expr.clone(),
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn position_clause(position: Option<&ColumnPosition>) -> String {
    match position {
        None => String::new(),
        Some(ColumnPosition::First) => " FIRST".to_string(),
        Some(ColumnPosition::After(column)) => format!(" AFTER {}", quote_identifier(column)),
    }
}

/// `UNIQUE KEY `name` (...)`; `keyword` is `KEY` inside CREATE, `INDEX` in ALTER
fn index_clause(index: &IndexDefinition, keyword: &str) -> String {
    let prefix = match (index.index_type, index.unique) {
        (IndexType::Fulltext, _) => "FULLTEXT ",
        (IndexType::Spatial, _) => "SPATIAL ",
        (_, true) => "UNIQUE ",
        (_, false) => "",
    };
    let using = match index.index_type {
        IndexType::Hash => " USING HASH",
        _ => "",
    };
    format!(
        "{}{} {} ({}){}",
        prefix,
        keyword,
        quote_identifier(&index.name),
        column_list(&index.columns),
        using
    )
}

fn foreign_key_clause(fk: &ForeignKeyDefinition) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        quote_identifier(&fk.name),
        quote_identifier(&fk.column),
        quote_identifier(&fk.ref_table),
        quote_identifier(&fk.ref_column),
        fk.on_delete.as_sql(),
        fk.on_update.as_sql()
    )
}

fn table_options(options: &TableOptions) -> String {
    let mut parts = Vec::new();
    if let Some(engine) = &options.engine {
        parts.push(format!("ENGINE={}", engine));
    }
    if let Some(charset) = &options.charset {
        parts.push(format!("DEFAULT CHARSET={}", charset));
    }
    if let Some(collation) = &options.collation {
        parts.push(format!("COLLATE={}", collation));
    }
    if let Some(comment) = &options.comment {
        parts.push(format!("COMMENT={}", quote_literal(comment)));
    }
    parts.join(" ")
}

fn changed_option(from: &Option<String>, to: &Option<String>) -> Option<String> {
    match to {
        Some(value) if from.as_deref() != Some(value.as_str()) => Some(value.clone()),
        _ => None,
    }
}

/// `PARTITION BY HASH (`col`) PARTITIONS n`
pub fn partition_clause(partition: &PartitionSpec) -> String {
    format!(
        "PARTITION BY {} ({}) PARTITIONS {}",
        partition.kind,
        quote_identifier(&partition.column),
        partition.count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CheckConstraint, PartitionKind, ReferentialAction};

    fn orders() -> TableSchema {
        let mut schema = TableSchema::new("orders")
            .with_column(Column::new("id", "BIGINT(20)").unsigned().auto_increment())
            .with_column(Column::new("tenant_id", "INT(11)"))
            .with_column(
                Column::new("status", "VARCHAR(20)")
                    .with_default(DefaultValue::Literal("new".to_string()))
                    .with_comment("order's state"),
            )
            .with_column(
                Column::new("created_at", "TIMESTAMP")
                    .with_default(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())),
            )
            .with_column(Column::new("notes", "TEXT").nullable().with_default(DefaultValue::Literal("x".to_string())))
            .with_primary_key(&["id", "tenant_id"])
            .with_index(IndexDefinition::new("orders_status_index", &["status"]));
        schema.options.engine = Some("InnoDB".to_string());
        schema.options.charset = Some("utf8mb4".to_string());
        schema.partition = Some(PartitionSpec {
            kind: PartitionKind::Hash,
            column: "tenant_id".to_string(),
            count: 8,
        });
        schema
    }

    #[test]
    fn test_create_table() {
        let sql = DdlGenerator::new().create_table(&orders());
        assert_eq!(
            sql,
            "CREATE TABLE `orders` (\n\
             \x20 `id` BIGINT(20) UNSIGNED NOT NULL AUTO_INCREMENT,\n\
             \x20 `tenant_id` INT(11) NOT NULL,\n\
             \x20 `status` VARCHAR(20) NOT NULL DEFAULT 'new' COMMENT 'order\\'s state',\n\
             \x20 `created_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n\
             \x20 `notes` TEXT NULL,\n\
             \x20 PRIMARY KEY (`id`, `tenant_id`),\n\
             \x20 KEY `orders_status_index` (`status`)\n\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4\n\
             PARTITION BY HASH (`tenant_id`) PARTITIONS 8"
        );
    }

    #[test]
    fn test_add_nullable_column() {
        let change = SchemaChange::AddColumn {
            column: Column::new("email", "VARCHAR(255)").nullable(),
            position: None,
        };
        assert_eq!(
            DdlGenerator::new().alter("t", &change).unwrap(),
            "ALTER TABLE `t` ADD COLUMN `email` VARCHAR(255) NULL"
        );
    }

    #[test]
    fn test_position_only_in_alter() {
        let change = SchemaChange::AddColumn {
            column: Column::new("slug", "VARCHAR(80)"),
            position: Some(ColumnPosition::After("title".to_string())),
        };
        let ddl = DdlGenerator::new();
        assert_eq!(
            ddl.alter("posts", &change).unwrap(),
            "ALTER TABLE `posts` ADD COLUMN `slug` VARCHAR(80) NOT NULL AFTER `title`"
        );
        assert_eq!(
            ddl.down_statements("posts", &[change]),
            vec!["ALTER TABLE `posts` DROP COLUMN `slug`"]
        );
    }

    #[test]
    fn test_rename_then_modify_and_inverse_order() {
        let changes = vec![
            SchemaChange::RenameColumn {
                from: "name".to_string(),
                to: "full_name".to_string(),
            },
            SchemaChange::ModifyColumn {
                from: Column::new("full_name", "VARCHAR(100)"),
                to: Column::new("full_name", "VARCHAR(200)"),
                position: None,
                prior_position: None,
            },
        ];
        let ddl = DdlGenerator::new();
        assert_eq!(
            ddl.up_statements("users", &changes),
            vec![
                "ALTER TABLE `users` RENAME COLUMN `name` TO `full_name`",
                "ALTER TABLE `users` MODIFY COLUMN `full_name` VARCHAR(200) NOT NULL",
            ]
        );
        assert_eq!(
            ddl.down_statements("users", &changes),
            vec![
                "ALTER TABLE `users` MODIFY COLUMN `full_name` VARCHAR(100) NOT NULL",
                "ALTER TABLE `users` RENAME COLUMN `full_name` TO `name`",
            ]
        );
    }

    #[test]
    fn test_moved_column_renders_position() {
        let change = SchemaChange::ModifyColumn {
            from: Column::new("b", "INT(11)"),
            to: Column::new("b", "INT(11)"),
            position: Some(ColumnPosition::After("id".to_string())),
            prior_position: Some(ColumnPosition::After("a".to_string())),
        };
        let ddl = DdlGenerator::new();
        assert_eq!(
            ddl.up_statements("t", &[change.clone()]),
            vec!["ALTER TABLE `t` MODIFY COLUMN `b` INT(11) NOT NULL AFTER `id`"]
        );
        assert_eq!(
            ddl.down_statements("t", &[change]),
            vec!["ALTER TABLE `t` MODIFY COLUMN `b` INT(11) NOT NULL AFTER `a`"]
        );
    }

    #[test]
    fn test_constraints() {
        let ddl = DdlGenerator::new();
        let fk = ForeignKeyDefinition {
            name: "posts_user_id_foreign".to_string(),
            column: "user_id".to_string(),
            ref_table: "users".to_string(),
            ref_column: "id".to_string(),
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::Restrict,
        };
        assert_eq!(
            ddl.alter("posts", &SchemaChange::AddForeignKey(fk.clone())).unwrap(),
            "ALTER TABLE `posts` ADD CONSTRAINT `posts_user_id_foreign` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE CASCADE ON UPDATE RESTRICT"
        );
        assert_eq!(
            ddl.alter("posts", &SchemaChange::DropForeignKey(fk)).unwrap(),
            "ALTER TABLE `posts` DROP FOREIGN KEY `posts_user_id_foreign`"
        );
        let unique = IndexDefinition::new("posts_slug_unique", &["slug"]).unique();
        assert_eq!(
            ddl.alter("posts", &SchemaChange::AddIndex(unique)).unwrap(),
            "ALTER TABLE `posts` ADD UNIQUE INDEX `posts_slug_unique` (`slug`)"
        );
        let check = CheckConstraint {
            name: "posts_score_check".to_string(),
            expression: "`score` >= 0".to_string(),
        };
        assert_eq!(
            ddl.alter("posts", &SchemaChange::DropCheck(check)).unwrap(),
            "ALTER TABLE `posts` DROP CHECK `posts_score_check`"
        );
    }

    #[test]
    fn test_primary_key_and_options() {
        let ddl = DdlGenerator::new();
        let pk = SchemaChange::ModifyPrimaryKey {
            from: vec!["id".to_string()],
            to: vec!["id".to_string(), "tenant_id".to_string()],
        };
        assert_eq!(
            ddl.alter("t", &pk).unwrap(),
            "ALTER TABLE `t` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`, `tenant_id`)"
        );

        let options = SchemaChange::ModifyTableOptions {
            from: TableOptions {
                engine: Some("MyISAM".to_string()),
                ..Default::default()
            },
            to: TableOptions {
                engine: Some("InnoDB".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(ddl.alter("t", &options).unwrap(), "ALTER TABLE `t` ENGINE=InnoDB");
        let unset = SchemaChange::ModifyTableOptions {
            from: TableOptions {
                comment: Some("x".to_string()),
                ..Default::default()
            },
            to: TableOptions::default(),
        };
        assert!(ddl.alter("t", &unset).is_none());
    }

    #[test]
    fn test_identifiers_are_quoted() {
        let ddl = DdlGenerator::new();
        assert_eq!(ddl.drop_table("we`ird"), "DROP TABLE `we``ird`");
        assert_eq!(
            ddl.rename_tables(&[("t", "t__old"), ("t__shadow", "t")]),
            "RENAME TABLE `t` TO `t__old`, `t__shadow` TO `t`"
        );
    }
}
