//! Migration System
//!
//! Versioned migration files, the tracking table and batch rollback.

pub mod definitions;
pub mod manager;
pub mod rollback;
pub mod runner;

pub use definitions::*;
pub use manager::{split_sql_statements, MigrationManager};
pub use runner::MigrationRunner;
