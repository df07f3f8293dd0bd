//! Model descriptors
//!
//! A model is described explicitly, either through the builder methods here
//! or by deserializing YAML/JSON:
//!
//! ```yaml
//! name: User
//! doc: |
//!   @table users
//!   @engine InnoDB
//! fields:
//!   - name: id
//!     doc: "@increments"
//!   - name: email
//!     doc: "@column @varchar 255 @unique"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// One declared field of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Raw tag block attached to the field
    #[serde(default)]
    pub doc: String,
    /// Class-level fields carry configuration, never columns
    #[serde(default)]
    pub is_static: bool,
}

/// A model type and its declared fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Raw docblock of the type itself (table-level tags)
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            doc: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn field(mut self, name: &str, doc: &str) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            doc: doc.to_string(),
            is_static: false,
        });
        self
    }

    pub fn static_field(mut self, name: &str, doc: &str) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            doc: doc.to_string(),
            is_static: true,
        });
        self
    }

    pub fn from_yaml(source: &str) -> SchemaResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json(source: &str) -> SchemaResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a descriptor file; `.json` is read as JSON, anything else as YAML
    pub fn load(path: &Path) -> SchemaResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let descriptor = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&source),
            _ => Self::from_yaml(&source),
        }?;
        if descriptor.name.trim().is_empty() {
            return Err(SchemaError::Serialization(format!(
                "Model descriptor {} has no name",
                path.display()
            )));
        }
        Ok(descriptor)
    }
}

/// `UserProfile` → `user_profiles`
pub fn default_table_name(model: &str) -> String {
    let mut snake = String::with_capacity(model.len() + 4);
    for (i, ch) in model.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
        } else {
            snake.push(ch);
        }
    }
    if snake.ends_with('s') {
        snake
    } else if snake.ends_with('y') && !snake.ends_with("ey") {
        snake.pop();
        snake.push_str("ies");
        snake
    } else {
        snake.push('s');
        snake
    }
}
