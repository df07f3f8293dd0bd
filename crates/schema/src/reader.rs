//! Schema Reader - introspects live tables
//!
//! Builds a [`TableSchema`] from `information_schema` and `SHOW CREATE TABLE`.
//! Columns come back in ordinal order, index columns in sequence order. The
//! partition clause and check constraints are only available from the
//! `SHOW CREATE TABLE` text and are parsed out of it.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backends::{quote_identifier, Database, Row};
use crate::error::{SchemaError, SchemaResult};
use crate::table::{
    is_default_keyword, CheckConstraint, Column, DefaultValue, ForeignKeyDefinition,
    IndexDefinition, IndexType, PartitionKind, PartitionSpec, ReferentialAction, TableOptions,
    TableSchema,
};

static PARTITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)PARTITION\s+BY\s+(?:LINEAR\s+)?(HASH|KEY)\s*\(([^)]*)\)\s*(?:PARTITIONS\s+(\d+))?")
        .expect("partition pattern is valid")
});

static PARTITION_BY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PARTITION\s+BY\b").expect("partition marker pattern is valid"));

static PARTITION_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:`((?:[^`]|``)+)`|([A-Za-z0-9_$]+))$").expect("partition column pattern is valid")
});

static CHECK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*CONSTRAINT\s+`((?:[^`]|``)+)`\s+CHECK\s+\((.*)\)\s*,?\s*$")
        .expect("check pattern is valid")
});

/// A foreign key in another table that points at the inspected one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencingKey {
    pub table: String,
    pub name: String,
    pub column: String,
}

/// Reads live table structure through a [`Database`] handle
#[derive(Clone)]
pub struct SchemaReader {
    db: Arc<dyn Database>,
}

impl SchemaReader {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Read the full structure of `table`
    pub async fn read(&self, table: &str) -> SchemaResult<TableSchema> {
        let escaped = self.db.escape(table);

        let options = self.read_options(&escaped).await?.ok_or_else(|| {
            tracing::debug!("Table '{}' does not exist", table);
            SchemaError::NotFound(table.to_string())
        })?;

        let mut schema = TableSchema::new(table);
        schema.options = options;
        schema.columns = self.read_columns(&escaped).await?;
        self.read_indexes(&escaped, &mut schema).await?;
        self.read_foreign_keys(&escaped, &mut schema).await?;

        let create_sql = self.show_create(table).await?;
        schema.partition = parse_partition(table, &create_sql)?;
        schema.checks = parse_checks(&create_sql)
            .into_iter()
            .map(|check| (check.name.clone(), check))
            .collect();

        tracing::debug!(
            "Read table '{}': {} column(s), {} index(es), {} foreign key(s)",
            table,
            schema.columns.len(),
            schema.indexes.len(),
            schema.foreign_keys.len()
        );
        Ok(schema)
    }

    pub async fn table_exists(&self, table: &str) -> SchemaResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}'",
            self.db.escape(table)
        );
        let output = self.db.execute(&sql).await?;
        Ok(output.first().and_then(|row| row.get_i64("n")).unwrap_or(0) > 0)
    }

    /// Foreign keys in other tables that reference `table`
    pub async fn referencing_foreign_keys(&self, table: &str) -> SchemaResult<Vec<ReferencingKey>> {
        let escaped = self.db.escape(table);
        let sql = format!(
            "SELECT TABLE_NAME AS table_name, CONSTRAINT_NAME AS name, COLUMN_NAME AS column_name \
             FROM information_schema.KEY_COLUMN_USAGE \
             WHERE REFERENCED_TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME = '{}' \
             AND TABLE_NAME <> '{}' \
             ORDER BY TABLE_NAME, CONSTRAINT_NAME",
            escaped, escaped
        );
        let output = self.db.execute(&sql).await?;
        output
            .rows
            .iter()
            .map(|row| {
                Ok(ReferencingKey {
                    table: row.require_str("table_name")?,
                    name: row.require_str("name")?,
                    column: row.require_str("column_name")?,
                })
            })
            .collect()
    }

    pub async fn row_count(&self, table: &str) -> SchemaResult<u64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", quote_identifier(table));
        let output = self.db.execute(&sql).await?;
        let count = output.first().and_then(|row| row.get_i64("n")).unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Raw `SHOW CREATE TABLE` text
    pub async fn show_create(&self, table: &str) -> SchemaResult<String> {
        let output = self
            .db
            .execute(&format!("SHOW CREATE TABLE {}", quote_identifier(table)))
            .await?;
        let row = output
            .first()
            .ok_or_else(|| SchemaError::NotFound(table.to_string()))?;
        row.require_str("Create Table")
    }

    async fn read_options(&self, escaped: &str) -> SchemaResult<Option<TableOptions>> {
        let sql = format!(
            "SELECT t.ENGINE AS engine, t.TABLE_COLLATION AS collation, \
             c.CHARACTER_SET_NAME AS charset, t.TABLE_COMMENT AS comment \
             FROM information_schema.TABLES t \
             LEFT JOIN information_schema.COLLATION_CHARACTER_SET_APPLICABILITY c \
             ON c.COLLATION_NAME = t.TABLE_COLLATION \
             WHERE t.TABLE_SCHEMA = DATABASE() AND t.TABLE_NAME = '{}'",
            escaped
        );
        let output = self.db.execute(&sql).await?;
        Ok(output.first().map(|row| TableOptions {
            engine: non_empty(row.get_str("engine")),
            charset: non_empty(row.get_str("charset")),
            collation: non_empty(row.get_str("collation")),
            comment: non_empty(row.get_str("comment")),
        }))
    }

    async fn read_columns(&self, escaped: &str) -> SchemaResult<Vec<Column>> {
        let sql = format!(
            "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS column_type, IS_NULLABLE AS nullable, \
             COLUMN_DEFAULT AS default_value, EXTRA AS extra, COLUMN_COMMENT AS comment \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION",
            escaped
        );
        let output = self.db.execute(&sql).await?;
        output.rows.iter().map(column_from_row).collect()
    }

    async fn read_indexes(&self, escaped: &str, schema: &mut TableSchema) -> SchemaResult<()> {
        let sql = format!(
            "SELECT INDEX_NAME AS index_name, COLUMN_NAME AS column_name, \
             NON_UNIQUE AS non_unique, INDEX_TYPE AS index_type \
             FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            escaped
        );
        let output = self.db.execute(&sql).await?;

        for row in &output.rows {
            let name = row.require_str("index_name")?;
            let column = row.require_str("column_name")?;

            if name.eq_ignore_ascii_case("PRIMARY") {
                schema.primary_key.push(column);
                continue;
            }

            let unique = row.get_i64("non_unique").unwrap_or(1) == 0;
            let index_type = IndexType::parse(&row.get_str("index_type").unwrap_or_default());
            schema
                .indexes
                .entry(name.clone())
                .or_insert_with(|| IndexDefinition {
                    name,
                    columns: Vec::new(),
                    unique,
                    index_type,
                })
                .columns
                .push(column);
        }
        Ok(())
    }

    async fn read_foreign_keys(&self, escaped: &str, schema: &mut TableSchema) -> SchemaResult<()> {
        let sql = format!(
            "SELECT k.CONSTRAINT_NAME AS name, k.COLUMN_NAME AS column_name, \
             k.REFERENCED_TABLE_NAME AS ref_table, k.REFERENCED_COLUMN_NAME AS ref_column, \
             r.DELETE_RULE AS on_delete, r.UPDATE_RULE AS on_update \
             FROM information_schema.KEY_COLUMN_USAGE k \
             JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
             ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA \
             AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME AND r.TABLE_NAME = k.TABLE_NAME \
             WHERE k.TABLE_SCHEMA = DATABASE() AND k.TABLE_NAME = '{}' \
             AND k.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
            escaped
        );
        let output = self.db.execute(&sql).await?;

        for row in &output.rows {
            let name = row.require_str("name")?;
            if schema.foreign_keys.contains_key(&name) {
                tracing::warn!(
                    "Foreign key '{}' on '{}' spans several columns; only the first is tracked",
                    name,
                    schema.name
                );
                continue;
            }
            let action = |column: &str| {
                row.get_str(column)
                    .and_then(|raw| ReferentialAction::parse(&raw))
                    .unwrap_or_default()
            };
            let fk = ForeignKeyDefinition {
                name: name.clone(),
                column: row.require_str("column_name")?,
                ref_table: row.require_str("ref_table")?,
                ref_column: row.require_str("ref_column")?,
                on_delete: action("on_delete"),
                on_update: action("on_update"),
            };
            schema.foreign_keys.insert(name, fk);
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn column_from_row(row: &Row) -> SchemaResult<Column> {
    let raw_type = row.require_str("column_type")?;
    let (sql_type, unsigned) = split_column_type(&raw_type);
    let extra = row.get_str("extra").unwrap_or_default().to_ascii_lowercase();

    Ok(Column {
        name: row.require_str("name")?,
        sql_type,
        unsigned,
        nullable: row
            .get_str("nullable")
            .map(|v| v.eq_ignore_ascii_case("YES"))
            .unwrap_or(false),
        default: parse_default(row.get_str("default_value"), &extra),
        auto_increment: extra.contains("auto_increment"),
        comment: non_empty(row.get_str("comment")),
    })
}

/// `int(10) unsigned zerofill` → (`INT(10)`, true)
pub(crate) fn split_column_type(raw: &str) -> (String, bool) {
    let lowered = raw.to_ascii_lowercase();
    let unsigned = lowered.contains(" unsigned");
    let end = lowered
        .find(" unsigned")
        .or_else(|| lowered.find(" zerofill"))
        .unwrap_or(raw.len());
    let sql_type = raw[..end].trim();

    let canonical = match sql_type.find('(') {
        Some(open) => format!("{}{}", sql_type[..open].to_ascii_uppercase(), &sql_type[open..]),
        None => sql_type.to_ascii_uppercase(),
    };
    (canonical, unsigned)
}

/// Classify an introspected default
///
/// MySQL reports expression defaults bare and flags them `DEFAULT_GENERATED`;
/// MariaDB quotes literal defaults and reports `NULL` as text.
pub(crate) fn parse_default(raw: Option<String>, extra: &str) -> Option<DefaultValue> {
    let raw = raw?;
    let trimmed = raw.trim();

    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        let inner = &trimmed[1..trimmed.len() - 1];
        return Some(DefaultValue::Literal(inner.replace("''", "'")));
    }
    if trimmed.eq_ignore_ascii_case("NULL") {
        return None;
    }
    if extra.contains("default_generated") || is_default_keyword(trimmed) {
        return Some(DefaultValue::Expression(trimmed.to_ascii_uppercase()));
    }
    Some(DefaultValue::Literal(raw))
}

/// The partition clause of a `SHOW CREATE TABLE` result
///
/// Only single-column `HASH`/`KEY` layouts are modelled; any other
/// partitioning is reported instead of being read as something it is not.
pub(crate) fn parse_partition(table: &str, create_sql: &str) -> SchemaResult<Option<PartitionSpec>> {
    if !PARTITION_BY_RE.is_match(create_sql) {
        return Ok(None);
    }
    let unsupported = |detail: String| {
        SchemaError::SchemaMismatch(format!(
            "Table '{}' uses unsupported partitioning ({}); only HASH or KEY on one column is supported",
            table, detail
        ))
    };

    let captures = PARTITION_RE
        .captures(create_sql)
        .ok_or_else(|| unsupported("not HASH or KEY".to_string()))?;
    let kind: PartitionKind = captures[1]
        .parse()
        .map_err(|_| unsupported(captures[1].to_string()))?;
    let raw = captures[2].trim();
    let column = match PARTITION_COLUMN_RE.captures(raw) {
        Some(c) => match (c.get(1), c.get(2)) {
            (Some(quoted), _) => quoted.as_str().replace("``", "`"),
            (None, Some(bare)) => bare.as_str().to_string(),
            (None, None) => return Err(unsupported(raw.to_string())),
        },
        None => {
            return Err(unsupported(format!("{} ({})", captures[1].to_uppercase(), raw)));
        }
    };
    let count = captures
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    Ok(Some(PartitionSpec { kind, column, count }))
}

pub(crate) fn parse_checks(create_sql: &str) -> Vec<CheckConstraint> {
    CHECK_RE
        .captures_iter(create_sql)
        .map(|captures| CheckConstraint {
            name: captures[1].replace("``", "`"),
            expression: captures[2].trim().to_string(),
        })
        .collect()
}
