//! Tag vocabulary
//!
//! [`TagRegistry`] maps a tag name to the handler that folds it into the
//! field being parsed. The built-in vocabulary covers column types,
//! composite shorthands and column attributes; callers add or override tags
//! with [`TagRegistry::register`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ColumnSpec, ForeignKeySpec};
use crate::backends::quote_literal;
use crate::table::{ColumnPosition, DefaultValue, ReferentialAction};

/// Working state for one field while its tags are applied
#[derive(Debug, Clone, Default)]
pub struct FieldState {
    pub spec: ColumnSpec,
    /// A type tag was seen
    pub has_type: bool,
    /// `@ignore` was seen
    pub ignored: bool,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

impl FieldState {
    pub fn new(field: &str) -> Self {
        Self {
            spec: ColumnSpec::new(field),
            ..Default::default()
        }
    }

    /// Set the column type; last one wins
    pub fn set_type(&mut self, base: &str, length: Option<String>) {
        self.spec.base_type = base.to_string();
        self.spec.length = length;
        self.has_type = true;
    }
}

/// How many arguments a tag takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No arguments; extra words are ignored
    Flag,
    /// Zero or more arguments
    Optional,
    /// At least one argument
    Required,
}

pub type TagHandler = Arc<dyn Fn(&mut FieldState, &[String]) -> Result<(), String> + Send + Sync>;

/// A registered tag
#[derive(Clone)]
pub struct TagDefinition {
    pub arity: Arity,
    apply: TagHandler,
}

impl TagDefinition {
    pub fn new<F>(arity: Arity, apply: F) -> Self
    where
        F: Fn(&mut FieldState, &[String]) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            arity,
            apply: Arc::new(apply),
        }
    }

    /// A flag tag that only flips state
    pub fn flag<F>(apply: F) -> Self
    where
        F: Fn(&mut FieldState) + Send + Sync + 'static,
    {
        Self::new(Arity::Flag, move |state, _| {
            apply(state);
            Ok(())
        })
    }

    pub fn apply(&self, state: &mut FieldState, args: &[String]) -> Result<(), String> {
        if self.arity == Arity::Required && args.is_empty() {
            return Err("requires an argument".to_string());
        }
        (self.apply)(state, args)
    }
}

impl fmt::Debug for TagDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagDefinition")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Case-insensitive tag lookup table
#[derive(Debug, Clone)]
pub struct TagRegistry {
    tags: HashMap<String, TagDefinition>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Type tags: tag, SQL type, default length/precision
const TYPE_TABLE: &[(&str, &str, Option<&str>)] = &[
    ("tinyint", "TINYINT", Some("4")),
    ("smallint", "SMALLINT", Some("6")),
    ("mediumint", "MEDIUMINT", Some("9")),
    ("int", "INT", Some("11")),
    ("integer", "INT", Some("11")),
    ("bigint", "BIGINT", Some("20")),
    ("decimal", "DECIMAL", Some("10,2")),
    ("float", "FLOAT", None),
    ("double", "DOUBLE", None),
    ("boolean", "TINYINT", Some("1")),
    ("bool", "TINYINT", Some("1")),
    ("varchar", "VARCHAR", Some("255")),
    ("string", "VARCHAR", Some("255")),
    ("char", "CHAR", Some("1")),
    ("binary", "BINARY", Some("1")),
    ("varbinary", "VARBINARY", Some("255")),
    ("text", "TEXT", None),
    ("tinytext", "TINYTEXT", None),
    ("mediumtext", "MEDIUMTEXT", None),
    ("longtext", "LONGTEXT", None),
    ("blob", "BLOB", None),
    ("tinyblob", "TINYBLOB", None),
    ("mediumblob", "MEDIUMBLOB", None),
    ("longblob", "LONGBLOB", None),
    ("json", "JSON", None),
    ("date", "DATE", None),
    ("datetime", "DATETIME", None),
    ("timestamp", "TIMESTAMP", None),
    ("time", "TIME", None),
    ("year", "YEAR", None),
];

impl TagRegistry {
    /// A registry with no tags at all
    pub fn empty() -> Self {
        Self {
            tags: HashMap::new(),
        }
    }

    /// The built-in vocabulary
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        for (tag, base, default_length) in TYPE_TABLE {
            registry.register(tag, sql_type_tag(base, *default_length));
        }
        registry.register("enum", enumerated_tag("ENUM"));
        registry.register("set", enumerated_tag("SET"));

        let autonumber = TagDefinition::flag(|state| {
            state.set_type("INT", Some("10".to_string()));
            state.spec.unsigned = true;
            state.spec.auto_increment = true;
            state.spec.primary = true;
        });
        registry.register("autonumber", autonumber.clone());
        registry.register("increments", autonumber);
        let big_autonumber = TagDefinition::flag(|state| {
            state.set_type("BIGINT", Some("20".to_string()));
            state.spec.unsigned = true;
            state.spec.auto_increment = true;
            state.spec.primary = true;
        });
        registry.register("bigautonumber", big_autonumber.clone());
        registry.register("bigincrements", big_autonumber);
        registry.register(
            "uuid",
            TagDefinition::flag(|state| {
                state.set_type("CHAR", Some("36".to_string()));
                state.spec.primary = true;
            }),
        );

        registry.register(
            "column",
            TagDefinition::new(Arity::Optional, |state, args| {
                if let Some(name) = args.first() {
                    state.spec.name = name.clone();
                }
                Ok(())
            }),
        );
        registry.register("nullable", TagDefinition::flag(|s| s.spec.nullable = true));
        registry.register("unsigned", TagDefinition::flag(|s| s.spec.unsigned = true));
        registry.register("unique", TagDefinition::flag(|s| s.spec.unique = true));
        registry.register("primary", TagDefinition::flag(|s| s.spec.primary = true));
        registry.register(
            "autoincrement",
            TagDefinition::flag(|s| s.spec.auto_increment = true),
        );
        registry.register("first", TagDefinition::flag(|s| s.spec.position = Some(ColumnPosition::First)));
        registry.register("drop", TagDefinition::flag(|s| s.spec.drop = true));
        registry.register("ignore", TagDefinition::flag(|s| s.ignored = true));
        registry.register(
            "index",
            TagDefinition::new(Arity::Optional, |state, args| {
                state.spec.indexed = true;
                if let Some(name) = args.first() {
                    state.spec.index_name = Some(name.clone());
                }
                Ok(())
            }),
        );
        registry.register(
            "default",
            TagDefinition::new(Arity::Required, |state, args| {
                state.spec.default = Some(DefaultValue::parse(&args.join(" ")));
                Ok(())
            }),
        );
        registry.register(
            "comment",
            TagDefinition::new(Arity::Required, |state, args| {
                state.spec.comment = Some(args.join(" "));
                Ok(())
            }),
        );
        registry.register(
            "check",
            TagDefinition::new(Arity::Required, |state, args| {
                state.spec.check = Some(args.join(" "));
                Ok(())
            }),
        );
        registry.register(
            "after",
            TagDefinition::new(Arity::Required, |state, args| {
                let column = args.first().ok_or("missing column name")?;
                state.spec.position = Some(ColumnPosition::After(column.clone()));
                Ok(())
            }),
        );
        let renamed = TagDefinition::new(Arity::Required, |state, args| {
            let old = args.first().ok_or("missing previous column name")?;
            state.spec.rename_from = Some(old.clone());
            Ok(())
        });
        registry.register("renamed", renamed.clone());
        registry.register("renamefrom", renamed);
        registry.register(
            "foreign",
            TagDefinition::new(Arity::Required, |state, args| {
                let target = args.join("");
                let (table, column) = parse_reference(&target).ok_or_else(|| {
                    format!("foreign key target '{}' must be written table(column)", target)
                })?;
                state.spec.foreign_key = Some(ForeignKeySpec {
                    table,
                    column,
                    on_delete: ReferentialAction::default(),
                    on_update: ReferentialAction::default(),
                });
                Ok(())
            }),
        );
        registry.register(
            "ondelete",
            TagDefinition::new(Arity::Required, |state, args| {
                state.on_delete = Some(parse_action(args)?);
                Ok(())
            }),
        );
        registry.register(
            "onupdate",
            TagDefinition::new(Arity::Required, |state, args| {
                state.on_update = Some(parse_action(args)?);
                Ok(())
            }),
        );

        registry
    }

    /// Add or replace a tag; returns the definition it replaced
    pub fn register(&mut self, name: &str, definition: TagDefinition) -> Option<TagDefinition> {
        self.tags.insert(name.to_ascii_lowercase(), definition)
    }

    pub fn get(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn sql_type_tag(base: &'static str, default_length: Option<&'static str>) -> TagDefinition {
    TagDefinition::new(Arity::Optional, move |state, args| {
        let length = match type_arguments(args)? {
            Some(length) => Some(length),
            None => default_length.map(str::to_string),
        };
        state.set_type(base, length);
        Ok(())
    })
}

fn enumerated_tag(base: &'static str) -> TagDefinition {
    TagDefinition::new(Arity::Optional, move |state, args| {
        let values: Vec<String> = args
            .iter()
            .flat_map(|arg| arg.trim_matches(|c| c == '(' || c == ')').split(','))
            .map(|value| value.trim().trim_matches(|c| c == '\'' || c == '"'))
            .filter(|value| !value.is_empty())
            .map(quote_literal)
            .collect();
        if values.is_empty() {
            return Err(format!("{} requires at least one value", base));
        }
        state.set_type(base, Some(values.join(",")));
        Ok(())
    })
}

/// `255`, `10 2`, `10,2` or `(10, 2)` → `10,2`
fn type_arguments(args: &[String]) -> Result<Option<String>, String> {
    let parts: Vec<&str> = args
        .iter()
        .flat_map(|arg| arg.trim_matches(|c| c == '(' || c == ')').split(','))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return Ok(None);
    }
    if let Some(bad) = parts.iter().find(|p| p.parse::<u32>().is_err()) {
        return Err(format!("type length '{}' is not a number", bad));
    }
    Ok(Some(parts.join(",")))
}

/// `table(column)` → (table, column)
pub(crate) fn parse_reference(target: &str) -> Option<(String, String)> {
    let (table, rest) = target.split_once('(')?;
    let column = rest.strip_suffix(')')?;
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
    if valid(table) && valid(column) {
        Some((table.to_string(), column.to_string()))
    } else {
        None
    }
}

fn parse_action(args: &[String]) -> Result<ReferentialAction, String> {
    let raw = args.join(" ");
    ReferentialAction::parse(&raw).ok_or_else(|| format!("unknown referential action '{}'", raw))
}
