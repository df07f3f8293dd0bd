//! Table Schema Model
//!
//! Structural snapshot of a table: ordered columns, primary key, indexes,
//! foreign keys, check constraints, storage options and an optional partition
//! clause. A [`TableSchema`] is produced by the reader from a live table, by
//! the annotation layer from a model, or deserialized from a migration's JSON
//! snapshot. Maps are ordered so serialized snapshots are stable.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// Column default: a literal value or an engine keyword/expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// Quoted when rendered: `DEFAULT 'abc'`
    Literal(String),
    /// Rendered bare: `DEFAULT CURRENT_TIMESTAMP`
    Expression(String),
}

impl DefaultValue {
    /// Classify an annotation argument or introspected default
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_default_keyword(trimmed) {
            DefaultValue::Expression(trimmed.to_ascii_uppercase())
        } else {
            DefaultValue::Literal(trimmed.to_string())
        }
    }

    fn normalized(&self) -> (bool, String) {
        match self {
            DefaultValue::Literal(value) => (false, value.clone()),
            DefaultValue::Expression(expr) => {
                let upper = expr.to_ascii_uppercase();
                let canonical = match upper.as_str() {
                    "NOW()" | "CURRENT_TIMESTAMP()" | "LOCALTIMESTAMP" | "LOCALTIMESTAMP()" => {
                        "CURRENT_TIMESTAMP".to_string()
                    }
                    _ => upper,
                };
                (true, canonical)
            }
        }
    }
}

/// Keywords that are defaults in their own right rather than string values
pub(crate) fn is_default_keyword(value: &str) -> bool {
    let upper = value.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "NULL" | "CURRENT_TIMESTAMP" | "NOW()" | "LOCALTIMESTAMP" | "LOCALTIMESTAMP()" | "CURRENT_DATE"
    ) || (upper.starts_with("CURRENT_TIMESTAMP(") && upper.ends_with(')'))
}

/// A resolved, storable column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Full SQL type without the UNSIGNED attribute, e.g. `VARCHAR(255)`
    pub sql_type: String,
    #[serde(default)]
    pub unsigned: bool,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    /// A NOT NULL column of the given type
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            unsigned: false,
            nullable: false,
            default: None,
            auto_increment: false,
            comment: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Type keyword without arguments, uppercased: `VARCHAR(255)` → `VARCHAR`
    pub fn base_type(&self) -> String {
        base_type(&self.sql_type)
    }

    pub fn is_numeric(&self) -> bool {
        is_numeric_type(&self.sql_type)
    }

    /// TEXT/BLOB/JSON/GEOMETRY families cannot carry a literal DEFAULT
    pub fn forbids_default(&self) -> bool {
        forbids_default(&self.sql_type)
    }

    /// Compare definitions, ignoring the name and engine-cosmetic differences
    pub fn same_definition(&self, other: &Column) -> bool {
        normalize_type(&self.sql_type) == normalize_type(&other.sql_type)
            && self.unsigned == other.unsigned
            && self.nullable == other.nullable
            && self.auto_increment == other.auto_increment
            && self.effective_default() == other.effective_default()
            && self.comment.as_deref().unwrap_or("") == other.comment.as_deref().unwrap_or("")
    }

    fn effective_default(&self) -> Option<(bool, String)> {
        if self.forbids_default() {
            return None;
        }
        match &self.default {
            // A nullable column without default and one defaulting to NULL are the same
            Some(DefaultValue::Expression(expr)) if expr.eq_ignore_ascii_case("NULL") => None,
            Some(default) => Some(default.normalized()),
            None => None,
        }
    }
}

/// Uppercased type keyword
pub fn base_type(sql_type: &str) -> String {
    sql_type
        .trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

pub fn is_numeric_type(sql_type: &str) -> bool {
    matches!(
        base_type(sql_type).as_str(),
        "TINYINT"
            | "SMALLINT"
            | "MEDIUMINT"
            | "INT"
            | "INTEGER"
            | "BIGINT"
            | "DECIMAL"
            | "NUMERIC"
            | "FLOAT"
            | "DOUBLE"
            | "REAL"
            | "BIT"
    )
}

pub fn forbids_default(sql_type: &str) -> bool {
    matches!(
        base_type(sql_type).as_str(),
        "TINYTEXT"
            | "TEXT"
            | "MEDIUMTEXT"
            | "LONGTEXT"
            | "TINYBLOB"
            | "BLOB"
            | "MEDIUMBLOB"
            | "LONGBLOB"
            | "JSON"
            | "GEOMETRY"
            | "POINT"
            | "LINESTRING"
            | "POLYGON"
    )
}

/// Canonical type text for comparisons: uppercase, no integer display width
/// (except the `TINYINT(1)` boolean idiom), no spacing inside arguments
pub fn normalize_type(sql_type: &str) -> String {
    let trimmed = sql_type.trim();
    let base = base_type(trimmed);
    let args: String = trimmed[base.len()..]
        .trim()
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",");

    match base.as_str() {
        "BOOL" | "BOOLEAN" => "TINYINT(1)".to_string(),
        "TINYINT" if args == "(1)" => "TINYINT(1)".to_string(),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" => base,
        "INT" | "INTEGER" => "INT".to_string(),
        _ => format!("{}{}", base, args),
    }
}

/// Where an added column goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPosition {
    First,
    After(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    #[default]
    BTree,
    Hash,
    Fulltext,
    Spatial,
}

impl IndexType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HASH" => IndexType::Hash,
            "FULLTEXT" => IndexType::Fulltext,
            "SPATIAL" => IndexType::Spatial,
            _ => IndexType::BTree,
        }
    }
}

/// Secondary index (the primary key is kept separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub index_type: IndexType,
}

impl IndexDefinition {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
            index_type: IndexType::BTree,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Same columns, uniqueness and type, regardless of name
    pub fn same_shape(&self, other: &IndexDefinition) -> bool {
        self.unique == other.unique
            && self.index_type == other.index_type
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    Restrict,
    Cascade,
    SetNull,
    NoAction,
    SetDefault,
}

impl ReferentialAction {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(&['_', '-'][..], " ");
        match normalized.as_str() {
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" => Some(ReferentialAction::SetNull),
            "NO ACTION" | "NOACTION" => Some(ReferentialAction::NoAction),
            "SET DEFAULT" | "SETDEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeyDefinition {
    /// Same column, target and actions, regardless of name
    pub fn same_shape(&self, other: &ForeignKeyDefinition) -> bool {
        self.column.eq_ignore_ascii_case(&other.column)
            && self.ref_table.eq_ignore_ascii_case(&other.ref_table)
            && self.ref_column.eq_ignore_ascii_case(&other.ref_column)
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionKind {
    Hash,
    Key,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKind::Hash => write!(f, "HASH"),
            PartitionKind::Key => write!(f, "KEY"),
        }
    }
}

impl std::str::FromStr for PartitionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HASH" | "LINEAR HASH" => Ok(PartitionKind::Hash),
            "KEY" | "LINEAR KEY" => Ok(PartitionKind::Key),
            other => Err(format!("Unsupported partition type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub kind: PartitionKind,
    pub column: String,
    pub count: u32,
}

/// Storage options; `None` means "engine default / unspecified"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableOptions {
    /// Compare only the options `desired` actually specifies
    pub fn satisfies(&self, desired: &TableOptions) -> bool {
        fn matches(live: &Option<String>, wanted: &Option<String>) -> bool {
            match wanted {
                None => true,
                Some(w) => live.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(w)),
            }
        }
        matches(&self.engine, &desired.engine)
            && matches(&self.charset, &desired.charset)
            && matches(&self.collation, &desired.collation)
            && (desired.comment.is_none()
                || self.comment.as_deref().unwrap_or("") == desired.comment.as_deref().unwrap_or(""))
    }
}

/// Structural snapshot of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDefinition>,
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKeyDefinition>,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckConstraint>,
    #[serde(default)]
    pub options: TableOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionSpec>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            checks: BTreeMap::new(),
            options: TableOptions::default(),
            partition: None,
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeyDefinition) -> Self {
        self.foreign_keys.insert(fk.name.clone(), fk);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Position that re-creates `name` exactly where it currently sits
    pub fn position_hint(&self, name: &str) -> Option<ColumnPosition> {
        let index = self.position_of(name)?;
        Some(match index {
            0 => ColumnPosition::First,
            n => ColumnPosition::After(self.columns[n - 1].name.clone()),
        })
    }

    /// Primary key plus every unique index, as column lists
    pub fn unique_keys(&self) -> Vec<(String, Vec<String>)> {
        let mut keys = Vec::new();
        if !self.primary_key.is_empty() {
            keys.push(("PRIMARY".to_string(), self.primary_key.clone()));
        }
        for index in self.indexes.values().filter(|i| i.unique) {
            keys.push((index.name.clone(), index.columns.clone()));
        }
        keys
    }

    /// Names of unique keys that do not contain `column`
    pub fn keys_missing_column(&self, column: &str) -> Vec<String> {
        self.unique_keys()
            .into_iter()
            .filter(|(_, cols)| !cols.iter().any(|c| c.eq_ignore_ascii_case(column)))
            .map(|(name, _)| name)
            .collect()
    }

    /// Foreign keys constraining `column`
    pub fn foreign_keys_on(&self, column: &str) -> Vec<&ForeignKeyDefinition> {
        self.foreign_keys
            .values()
            .filter(|fk| fk.column.eq_ignore_ascii_case(column))
            .collect()
    }

    /// Indexes containing `column`
    pub fn indexes_on(&self, column: &str) -> Vec<&IndexDefinition> {
        self.indexes
            .values()
            .filter(|i| i.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
            .collect()
    }

    /// Check structural invariants
    pub fn validate(&self) -> SchemaResult<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(SchemaError::SchemaMismatch(format!(
                    "Duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }

        let missing = |col: &str| !seen.contains(&col.to_ascii_lowercase());

        if let Some(col) = self.primary_key.iter().find(|c| missing(c)) {
            return Err(SchemaError::SchemaMismatch(format!(
                "Primary key of '{}' references unknown column '{}'",
                self.name, col
            )));
        }
        for index in self.indexes.values() {
            if let Some(col) = index.columns.iter().find(|c| missing(c)) {
                return Err(SchemaError::SchemaMismatch(format!(
                    "Index '{}' of '{}' references unknown column '{}'",
                    index.name, self.name, col
                )));
            }
        }
        for fk in self.foreign_keys.values() {
            if missing(&fk.column) {
                return Err(SchemaError::SchemaMismatch(format!(
                    "Foreign key '{}' of '{}' references unknown column '{}'",
                    fk.name, self.name, fk.column
                )));
            }
        }
        if let Some(partition) = &self.partition {
            if missing(&partition.column) {
                return Err(SchemaError::SchemaMismatch(format!(
                    "Partition column '{}' does not exist in '{}'",
                    partition.column, self.name
                )));
            }
            let violations = self.keys_missing_column(&partition.column);
            if !violations.is_empty() {
                return Err(SchemaError::SchemaMismatch(format!(
                    "Partition column '{}' must be part of every unique key; missing from {}",
                    partition.column,
                    violations.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> SchemaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SchemaResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .with_column(Column::new("id", "INT(10)").unsigned().auto_increment())
            .with_column(Column::new("email", "VARCHAR(255)"))
            .with_column(Column::new("tenant_id", "INT(11)"))
            .with_primary_key(&["id"])
            .with_index(IndexDefinition::new("uniq_email", &["email"]).unique())
    }

    #[test]
    fn test_normalize_type_ignores_integer_display_width() {
        assert_eq!(normalize_type("int(11)"), "INT");
        assert_eq!(normalize_type("INTEGER"), "INT");
        assert_eq!(normalize_type("bigint(20)"), "BIGINT");
        assert_eq!(normalize_type("tinyint(1)"), "TINYINT(1)");
        assert_eq!(normalize_type("BOOLEAN"), "TINYINT(1)");
        assert_eq!(normalize_type("decimal(10, 2)"), "DECIMAL(10,2)");
        assert_eq!(normalize_type("varchar(255)"), "VARCHAR(255)");
    }

    #[test]
    fn test_same_definition_normalizes_cosmetics() {
        let a = Column::new("n", "INT(11)").with_default(DefaultValue::Expression("NULL".into())).nullable();
        let b = Column::new("n", "int").nullable();
        assert!(a.same_definition(&b));

        let c = Column::new("ts", "TIMESTAMP").with_default(DefaultValue::Expression("NOW()".into()));
        let d = Column::new("ts", "timestamp").with_default(DefaultValue::parse("CURRENT_TIMESTAMP"));
        assert!(c.same_definition(&d));

        let e = Column::new("n", "INT(11)");
        assert!(!e.same_definition(&b));
    }

    #[test]
    fn test_default_value_parse() {
        assert_eq!(DefaultValue::parse("current_timestamp"), DefaultValue::Expression("CURRENT_TIMESTAMP".into()));
        assert_eq!(DefaultValue::parse("CURRENT_TIMESTAMP(3)"), DefaultValue::Expression("CURRENT_TIMESTAMP(3)".into()));
        assert_eq!(DefaultValue::parse("active"), DefaultValue::Literal("active".into()));
        assert_eq!(DefaultValue::parse("0"), DefaultValue::Literal("0".into()));
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let schema = users().with_column(Column::new("EMAIL", "TEXT"));
        assert!(matches!(schema.validate(), Err(SchemaError::SchemaMismatch(_))));
    }

    #[test]
    fn test_validate_rejects_partition_outside_unique_keys() {
        let mut schema = users();
        schema.partition = Some(PartitionSpec {
            kind: PartitionKind::Hash,
            column: "tenant_id".to_string(),
            count: 4,
        });
        let err = schema.validate().unwrap_err().to_string();
        assert!(err.contains("PRIMARY"));
        assert!(err.contains("uniq_email"));
    }

    #[test]
    fn test_position_hint() {
        let schema = users();
        assert_eq!(schema.position_hint("id"), Some(ColumnPosition::First));
        assert_eq!(schema.position_hint("tenant_id"), Some(ColumnPosition::After("email".into())));
        assert_eq!(schema.position_hint("nope"), None);
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let schema = users();
        let json = schema.to_json_pretty().unwrap();
        assert_eq!(TableSchema::from_json(&json).unwrap(), schema);
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("cascade"), Some(ReferentialAction::Cascade));
        assert_eq!(ReferentialAction::parse("set_null"), Some(ReferentialAction::SetNull));
        assert_eq!(ReferentialAction::parse("NO ACTION"), Some(ReferentialAction::NoAction));
        assert_eq!(ReferentialAction::parse("explode"), None);
    }
}
