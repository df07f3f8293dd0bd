//! # tidemark-schema: Schema Engine for tidemark
//!
//! Keeps MySQL tables in line with annotated model definitions:
//!
//! - [`annotation`]: tag vocabulary and the parser turning field docblocks
//!   into column specs
//! - [`reader`]: live table structure from `information_schema`
//! - [`differ`]: desired-vs-live and snapshot-vs-snapshot change lists
//! - [`ddl`]: `CREATE`/`ALTER` rendering
//! - [`migrations`]: versioned migration files, tracking and rollback
//! - [`transform`]: copy-swap rewrites for partitioning changes
//!
//! Every component talks to the server through the [`Database`] handle.

pub mod annotation;
pub mod backends;
pub mod change;
pub mod ddl;
pub mod differ;
pub mod error;
pub mod migrations;
pub mod reader;
pub mod sync;
pub mod table;
pub mod transform;

// Re-export core traits and types
pub use annotation::{AnnotationParser, ColumnSpec, ModelDescriptor, ModelSchema, TagRegistry};
pub use backends::{Database, DatabaseValue, MySqlHandle, QueryOutput, Row, ScriptedDatabase};
pub use change::SchemaChange;
pub use ddl::DdlGenerator;
pub use differ::{PendingChangeReport, SchemaDiffer};
pub use error::{SchemaError, SchemaResult};
pub use migrations::{MigrationConfig, MigrationManager, MigrationRunner};
pub use reader::SchemaReader;
pub use sync::{SchemaSync, UpdatePlan};
pub use table::*;
pub use transform::{TableTransformer, TransformOptions, TransformReport, TransformState};
