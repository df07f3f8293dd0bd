//! Database Handle Abstractions
//!
//! The narrow handle contract every component consumes, the MySQL
//! implementation over sqlx, and a scripted handle for tests and dry runs.

pub mod core;
pub mod mysql;
pub mod scripted;

// Re-export core traits and types
pub use self::core::*;
pub use self::mysql::MySqlHandle;
pub use self::scripted::ScriptedDatabase;
