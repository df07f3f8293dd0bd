//! Annotation parsing
//!
//! Turns the tag blocks of a [`ModelDescriptor`] into [`ColumnSpec`]s and,
//! from there, into the desired [`TableSchema`]. Field blocks are tokenized
//! into `@tag args...` groups and each recognized tag is applied through the
//! [`TagRegistry`]; unknown tags are skipped. Table-level tags (name, engine,
//! charset, composite indexes, partitioning) come from the model's own
//! docblock.

pub mod model;
pub mod tags;
pub mod tokenizer;

use std::collections::HashSet;

use crate::error::{SchemaError, SchemaResult};
use crate::table::{
    forbids_default, is_numeric_type, CheckConstraint, Column, ColumnPosition, DefaultValue,
    ForeignKeyDefinition, IndexDefinition, PartitionKind, PartitionSpec, ReferentialAction,
    TableOptions, TableSchema,
};

pub use model::{default_table_name, FieldDescriptor, ModelDescriptor};
pub use tags::{Arity, FieldState, TagDefinition, TagHandler, TagRegistry};
pub use tokenizer::{tokenize, TagToken};

/// Foreign key declared on a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub table: String,
    pub column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Parsed schema declaration of one field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSpec {
    pub name: String,
    /// SQL type keyword, e.g. `VARCHAR`
    pub base_type: String,
    /// Length/precision or enumerated values, e.g. `255`, `10,2`
    pub length: Option<String>,
    pub nullable: bool,
    pub unsigned: bool,
    pub default: Option<DefaultValue>,
    pub auto_increment: bool,
    pub primary: bool,
    pub unique: bool,
    pub indexed: bool,
    pub index_name: Option<String>,
    pub comment: Option<String>,
    pub foreign_key: Option<ForeignKeySpec>,
    pub position: Option<ColumnPosition>,
    pub drop: bool,
    pub rename_from: Option<String>,
    pub check: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Full type, e.g. `VARCHAR(255)`
    pub fn sql_type(&self) -> String {
        match &self.length {
            Some(length) => format!("{}({})", self.base_type, length),
            None => self.base_type.clone(),
        }
    }

    pub fn to_column(&self) -> Column {
        Column {
            name: self.name.clone(),
            sql_type: self.sql_type(),
            unsigned: self.unsigned,
            nullable: self.nullable,
            default: self.default.clone(),
            auto_increment: self.auto_increment,
            comment: self.comment.clone(),
        }
    }
}

/// Table-level declarations from the model docblock
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableAnnotations {
    pub options: TableOptions,
    pub indexes: Vec<IndexDefinition>,
    pub partition: Option<PartitionSpec>,
}

/// A parsed model: its table name and every schema-bearing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    pub model: String,
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub table_annotations: TableAnnotations,
}

impl ModelSchema {
    /// Columns that remain after drop markers
    pub fn kept_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.drop)
    }

    /// Columns marked for removal
    pub fn dropped_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.drop)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The table this model declares, without the dropped columns
    pub fn desired_schema(&self) -> SchemaResult<TableSchema> {
        let table = &self.table;
        let mut schema = TableSchema::new(table);
        schema.options = self.table_annotations.options.clone();
        schema.partition = self.table_annotations.partition.clone();

        for spec in self.kept_columns() {
            schema.columns.push(spec.to_column());
            let col = spec.name.as_str();

            if spec.primary {
                schema.primary_key.push(spec.name.clone());
            }
            if spec.unique && !spec.primary {
                let name = spec
                    .index_name
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}_unique", table, col));
                schema.indexes.insert(name.clone(), IndexDefinition::new(&name, &[col]).unique());
            } else if spec.indexed {
                let name = spec
                    .index_name
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}_index", table, col));
                schema.indexes.insert(name.clone(), IndexDefinition::new(&name, &[col]));
            }
            if let Some(fk) = &spec.foreign_key {
                let name = format!("{}_{}_foreign", table, col);
                schema.foreign_keys.insert(
                    name.clone(),
                    ForeignKeyDefinition {
                        name,
                        column: spec.name.clone(),
                        ref_table: fk.table.clone(),
                        ref_column: fk.column.clone(),
                        on_delete: fk.on_delete,
                        on_update: fk.on_update,
                    },
                );
            }
            if let Some(expression) = &spec.check {
                let name = format!("{}_{}_check", table, col);
                schema.checks.insert(
                    name.clone(),
                    CheckConstraint {
                        name,
                        expression: expression.clone(),
                    },
                );
            }
        }

        for index in &self.table_annotations.indexes {
            if schema.indexes.contains_key(&index.name) {
                return Err(SchemaError::annotation(
                    &self.model,
                    format!("index name '{}' is declared twice", index.name),
                ));
            }
            schema.indexes.insert(index.name.clone(), index.clone());
        }

        schema.validate()?;
        Ok(schema)
    }
}

/// Parses tag blocks with a [`TagRegistry`]
#[derive(Debug, Clone, Default)]
pub struct AnnotationParser {
    registry: TagRegistry,
}

impl AnnotationParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: TagRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TagRegistry {
        &mut self.registry
    }

    /// Parse one field's tag block
    ///
    /// Returns `None` for blocks without any recognized tag and for
    /// `@ignore`d fields.
    pub fn parse_field(&self, field: &str, block: &str) -> SchemaResult<Option<ColumnSpec>> {
        let mut state = FieldState::new(field);
        let mut recognized = false;

        for token in tokenize(block) {
            let Some(definition) = self.registry.get(&token.name) else {
                tracing::trace!("Skipping unknown tag @{} on field '{}'", token.name, field);
                continue;
            };
            recognized = true;

            match definition.arity {
                Arity::Required if token.args.is_empty() => {
                    return Err(SchemaError::annotation(
                        field,
                        format!("@{} requires an argument", token.name),
                    ));
                }
                Arity::Flag if !token.args.is_empty() => {
                    tracing::warn!(
                        "Ignoring arguments '{}' of flag tag @{} on field '{}'",
                        token.joined_args(),
                        token.name,
                        field
                    );
                }
                _ => {}
            }

            definition
                .apply(&mut state, &token.args)
                .map_err(|message| SchemaError::annotation(field, format!("@{}: {}", token.name, message)))?;
        }

        if !recognized || state.ignored {
            return Ok(None);
        }
        finish_field(field, state).map(Some)
    }

    pub fn parse_field_descriptor(&self, field: &FieldDescriptor) -> SchemaResult<Option<ColumnSpec>> {
        if field.is_static {
            return Ok(None);
        }
        self.parse_field(&field.name, &field.doc)
    }

    /// Parse a whole model
    pub fn parse_model(&self, model: &ModelDescriptor) -> SchemaResult<ModelSchema> {
        let table_tokens = tokenize(&model.doc);
        let table = model
            .table
            .clone()
            .or_else(|| {
                table_tokens
                    .iter()
                    .rev()
                    .find(|t| t.name == "table")
                    .and_then(|t| t.args.first().cloned())
            })
            .unwrap_or_else(|| default_table_name(&model.name));

        let table_annotations = parse_table_tokens(&model.name, &table, &table_tokens)?;

        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        for field in &model.fields {
            let Some(spec) = self.parse_field_descriptor(field)? else {
                continue;
            };
            if !seen.insert(spec.name.to_ascii_lowercase()) {
                return Err(SchemaError::annotation(
                    &field.name,
                    format!("column '{}' is declared by more than one field", spec.name),
                ));
            }
            columns.push(spec);
        }

        tracing::debug!(
            "Parsed model {} into {} column(s) for table '{}'",
            model.name,
            columns.len(),
            table
        );

        Ok(ModelSchema {
            model: model.name.clone(),
            table,
            columns,
            table_annotations,
        })
    }

    /// Parse only the table-level tags of a docblock
    pub fn parse_table_tags(&self, model: &str, table: &str, doc: &str) -> SchemaResult<TableAnnotations> {
        parse_table_tokens(model, table, &tokenize(doc))
    }
}

fn finish_field(field: &str, state: FieldState) -> SchemaResult<ColumnSpec> {
    let FieldState {
        mut spec,
        has_type,
        on_delete,
        on_update,
        ..
    } = state;

    if spec.drop {
        if spec.rename_from.is_some() {
            return Err(SchemaError::annotation(
                field,
                "a field cannot be both dropped and renamed",
            ));
        }
        return Ok(spec);
    }

    if !has_type {
        return Err(SchemaError::annotation(field, "no column type tag"));
    }
    if spec.unsigned && !is_numeric_type(&spec.sql_type()) {
        return Err(SchemaError::annotation(
            field,
            format!("unsigned is not valid for {}", spec.sql_type()),
        ));
    }
    if spec.primary && spec.nullable {
        return Err(SchemaError::annotation(
            field,
            "a primary key column cannot be nullable",
        ));
    }
    if let Some(old) = &spec.rename_from {
        if old.eq_ignore_ascii_case(&spec.name) {
            return Err(SchemaError::annotation(
                field,
                format!("column '{}' is renamed from itself", old),
            ));
        }
    }

    match spec.foreign_key.as_mut() {
        Some(fk) => {
            if let Some(action) = on_delete {
                fk.on_delete = action;
            }
            if let Some(action) = on_update {
                fk.on_update = action;
            }
        }
        None if on_delete.is_some() || on_update.is_some() => {
            return Err(SchemaError::annotation(
                field,
                "referential actions require @foreign",
            ));
        }
        None => {}
    }

    if spec.default.is_some() && forbids_default(&spec.sql_type()) {
        tracing::warn!(
            "Default on {} column '{}' will not be rendered",
            spec.sql_type(),
            spec.name
        );
    }

    Ok(spec)
}

fn parse_table_tokens(model: &str, table: &str, tokens: &[TagToken]) -> SchemaResult<TableAnnotations> {
    let mut annotations = TableAnnotations::default();
    let required = |token: &TagToken| -> SchemaResult<String> {
        if token.args.is_empty() {
            Err(SchemaError::annotation(
                model,
                format!("@{} requires an argument", token.name),
            ))
        } else {
            Ok(token.joined_args())
        }
    };

    for token in tokens {
        match token.name.as_str() {
            "table" => {
                required(token)?;
            }
            "engine" => annotations.options.engine = Some(required(token)?),
            "charset" => annotations.options.charset = Some(required(token)?),
            "collation" => annotations.options.collation = Some(required(token)?),
            "comment" => annotations.options.comment = Some(required(token)?),
            "index" | "unique" => {
                required(token)?;
                let unique = token.name == "unique";
                let index = parse_composite(table, &token.args.join(""), unique)
                    .ok_or_else(|| {
                        SchemaError::annotation(
                            model,
                            format!("@{} must be written name(col1,col2)", token.name),
                        )
                    })?;
                annotations.indexes.push(index);
            }
            "partition" => {
                annotations.partition = Some(parse_partition(model, &token.args)?);
            }
            other => tracing::trace!("Skipping unknown table tag @{} on model {}", other, model),
        }
    }
    Ok(annotations)
}

/// `name(a,b)` or `(a,b)`
fn parse_composite(table: &str, raw: &str, unique: bool) -> Option<IndexDefinition> {
    let (name, rest) = raw.split_once('(')?;
    let columns: Vec<&str> = rest
        .strip_suffix(')')?
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if columns.is_empty() {
        return None;
    }
    let name = match name.trim() {
        "" => format!(
            "{}_{}_{}",
            table,
            columns.join("_"),
            if unique { "unique" } else { "index" }
        ),
        explicit => explicit.to_string(),
    };
    let index = IndexDefinition::new(&name, &columns);
    Some(if unique { index.unique() } else { index })
}

/// `hash(col) 8` or `key(col) 8`
fn parse_partition(model: &str, args: &[String]) -> SchemaResult<PartitionSpec> {
    let malformed = || {
        SchemaError::annotation(
            model,
            "@partition must be written hash(column) <count> or key(column) <count>",
        )
    };
    let (kind, column) = args
        .first()
        .and_then(|a| tags::parse_reference(a))
        .ok_or_else(malformed)?;
    let kind: PartitionKind = kind.parse().map_err(|_| malformed())?;
    let count: u32 = args
        .get(1)
        .and_then(|c| c.parse().ok())
        .filter(|c| *c > 0)
        .ok_or_else(malformed)?;
    Ok(PartitionSpec { kind, column, count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varchar_unique_column() {
        let parser = AnnotationParser::new();
        let spec = parser
            .parse_field("email", "@column @varchar 255 @unique")
            .unwrap()
            .unwrap();

        assert_eq!(spec.name, "email");
        assert_eq!(spec.sql_type(), "VARCHAR(255)");
        assert!(!spec.nullable);
        assert!(spec.unique);
    }

    #[test]
    fn test_fields_without_schema_tags_are_skipped() {
        let parser = AnnotationParser::new();
        assert!(parser.parse_field("cache", "@var array").unwrap().is_none());
        assert!(parser.parse_field("cache", "").unwrap().is_none());
        assert!(parser.parse_field("tmp", "@column @int @ignore").unwrap().is_none());
        let stat = FieldDescriptor {
            name: "table".to_string(),
            doc: "@column @varchar".to_string(),
            is_static: true,
        };
        assert!(parser.parse_field_descriptor(&stat).unwrap().is_none());
    }

    #[test]
    fn test_scalars_last_wins_flags_accumulate() {
        let parser = AnnotationParser::new();
        let spec = parser
            .parse_field(
                "score",
                "@int @nullable\n@bigint @comment first\n@comment second @after name @first",
            )
            .unwrap()
            .unwrap();
        assert_eq!(spec.sql_type(), "BIGINT(20)");
        assert!(spec.nullable);
        assert_eq!(spec.comment.as_deref(), Some("second"));
        assert_eq!(spec.position, Some(ColumnPosition::First));
    }

    #[test]
    fn test_default_keywords_and_literals() {
        let parser = AnnotationParser::new();
        let created = parser
            .parse_field("created_at", "@timestamp @default CURRENT_TIMESTAMP")
            .unwrap()
            .unwrap();
        assert_eq!(
            created.default,
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()))
        );

        let status = parser
            .parse_field("status", "@varchar 20 @default 'pending review'")
            .unwrap()
            .unwrap();
        assert_eq!(
            status.default,
            Some(DefaultValue::Literal("pending review".to_string()))
        );
    }

    #[test]
    fn test_annotation_errors() {
        let parser = AnnotationParser::new();
        let cases = [
            ("@column @nullable", "no column type"),
            ("@varchar @unsigned", "unsigned"),
            ("@int @foreign users.id", "table(column)"),
            ("@enum", "at least one value"),
            ("@int @drop @renamed old", "dropped and renamed"),
            ("@int @default", "requires an argument"),
            ("@int @ondelete cascade", "require @foreign"),
            ("@int @primary @nullable", "cannot be nullable"),
        ];
        for (block, expected) in cases {
            match parser.parse_field("f", block) {
                Err(SchemaError::Annotation { field, message }) => {
                    assert_eq!(field, "f");
                    assert!(message.contains(expected), "{}: {}", block, message);
                }
                other => panic!("{} should fail, got {:?}", block, other),
            }
        }
    }

    #[test]
    fn test_drop_marker_needs_no_type() {
        let parser = AnnotationParser::new();
        let spec = parser.parse_field("legacy", "@drop").unwrap().unwrap();
        assert!(spec.drop);
    }

    #[test]
    fn test_model_to_desired_schema() {
        let model = ModelDescriptor::new("Post")
            .doc("/**\n * Blog posts\n * @engine InnoDB\n * @charset utf8mb4\n * @index tenant_created(tenant_id, created_at)\n * @partition hash(tenant_id) 8\n */")
            .field("id", "@autonumber")
            .field("tenant_id", "@int @unsigned @index")
            .field("author_id", "@int @unsigned @foreign users(id) @ondelete cascade")
            .field("slug", "@string 120 @unique")
            .field("created_at", "@datetime")
            .field("legacy", "@drop")
            .static_field("connection", "@column @varchar");

        let parsed = AnnotationParser::new().parse_model(&model).unwrap();
        assert_eq!(parsed.table, "posts");
        assert_eq!(parsed.dropped_columns().count(), 1);

        let mut parsed = parsed;
        // slug is unique without tenant_id
        parsed.table_annotations.partition = None;
        let schema = parsed.desired_schema().unwrap();

        assert_eq!(
            schema.column_names(),
            vec!["id", "tenant_id", "author_id", "slug", "created_at"]
        );
        assert_eq!(schema.primary_key, vec!["id"]);
        assert!(schema.indexes["posts_slug_unique"].unique);
        assert_eq!(schema.indexes["posts_tenant_id_index"].columns, vec!["tenant_id"]);
        assert_eq!(
            schema.indexes["tenant_created"].columns,
            vec!["tenant_id", "created_at"]
        );
        let fk = &schema.foreign_keys["posts_author_id_foreign"];
        assert_eq!(fk.on_delete, ReferentialAction::Cascade);
        assert_eq!(schema.options.engine.as_deref(), Some("InnoDB"));
    }

    #[test]
    fn test_partition_must_cover_unique_keys() {
        let model = ModelDescriptor::new("Event")
            .table("events")
            .doc("@partition key(tenant_id) 4")
            .field("id", "@bigautonumber")
            .field("tenant_id", "@int");

        let parsed = AnnotationParser::new().parse_model(&model).unwrap();
        assert_eq!(
            parsed.table_annotations.partition,
            Some(PartitionSpec {
                kind: PartitionKind::Key,
                column: "tenant_id".to_string(),
                count: 4
            })
        );
        assert!(matches!(
            parsed.desired_schema(),
            Err(SchemaError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_malformed_table_tags() {
        let parser = AnnotationParser::new();
        assert!(parser.parse_table_tags("M", "m", "@partition hash(id)").is_err());
        assert!(parser.parse_table_tags("M", "m", "@partition range(id) 4").is_err());
        assert!(parser.parse_table_tags("M", "m", "@index by_name").is_err());
        let ok = parser.parse_table_tags("M", "m", "@unique (a, b)").unwrap();
        assert_eq!(ok.indexes[0].name, "m_a_b_unique");
    }

    #[test]
    fn test_duplicate_column_names() {
        let model = ModelDescriptor::new("User")
            .field("email", "@varchar")
            .field("mail", "@column email @varchar");
        let err = AnnotationParser::new().parse_model(&model).unwrap_err();
        assert!(matches!(err, SchemaError::Annotation { .. }));
    }

    #[test]
    fn test_table_tag_names_table() {
        let model = ModelDescriptor::new("Person").doc("@table people").field("id", "@increments");
        let parsed = AnnotationParser::new().parse_model(&model).unwrap();
        assert_eq!(parsed.table, "people");
    }
}
