//! Migration Manager - File system operations for migrations
//!
//! Handles creating, generating, loading, and parsing migration files. A
//! migration is a `<id>.sql` file with `-- Up migration` and
//! `-- Down migration` sections; generated migrations also carry a
//! `<id>.schema.json` snapshot that the next generation diffs against.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer};

use super::definitions::{Migration, MigrationConfig, SchemaSnapshot};
use crate::ddl::DdlGenerator;
use crate::differ::SchemaDiffer;
use crate::error::{SchemaError, SchemaResult};
use crate::table::TableSchema;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const SNAPSHOT_SUFFIX: &str = ".schema.json";

/// Migration manager for creating and loading migrations
pub struct MigrationManager {
    config: MigrationConfig,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    /// Create a new migration manager with default configuration
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Create an empty migration file for hand-written SQL
    pub async fn create_migration(&self, name: &str) -> SchemaResult<Migration> {
        let (id, created_at) = self.next_id(name)?;
        let migration = Migration {
            id,
            name: name.to_string(),
            up_statements: Vec::new(),
            down_statements: Vec::new(),
            created_at,
            snapshot: None,
        };
        self.write_migration(&migration)?;
        Ok(migration)
    }

    /// Generate a migration that moves `table` from its last snapshot to `target`
    ///
    /// Without a previous snapshot the migration creates the table. Returns
    /// `None` when the snapshot already matches.
    pub async fn generate_migration(
        &self,
        name: &str,
        target: &TableSchema,
    ) -> SchemaResult<Option<Migration>> {
        target.validate()?;
        let ddl = DdlGenerator::new();

        let (up_statements, down_statements) = match self.latest_snapshot(&target.name).await? {
            None => (
                vec![ddl.create_table(target)],
                vec![ddl.drop_table(&target.name)],
            ),
            Some(previous) => {
                let changes = SchemaDiffer::new().diff(&previous, target)?;
                if changes.is_empty() {
                    tracing::info!("Table '{}' matches its last snapshot", target.name);
                    return Ok(None);
                }
                (
                    ddl.up_statements(&target.name, &changes),
                    ddl.down_statements(&target.name, &changes),
                )
            }
        };

        let (id, created_at) = self.next_id(name)?;
        let mut snapshot = SchemaSnapshot::new();
        snapshot.insert(target.name.clone(), target.clone());

        let migration = Migration {
            id,
            name: name.to_string(),
            up_statements,
            down_statements,
            created_at,
            snapshot: Some(snapshot),
        };
        self.write_migration(&migration)?;
        tracing::info!(
            "Generated migration {} ({} up, {} down)",
            migration.id,
            migration.up_statements.len(),
            migration.down_statements.len()
        );
        Ok(Some(migration))
    }

    /// Load all migration files from the migrations directory, oldest first
    pub async fn load_migrations(&self) -> SchemaResult<Vec<Migration>> {
        if !self.config.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for entry in fs::read_dir(&self.config.migrations_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                migrations.push(self.parse_migration_file(&path)?);
            }
        }

        migrations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(migrations)
    }

    /// Find a loaded migration by id
    pub async fn find_migration(&self, id: &str) -> SchemaResult<Option<Migration>> {
        Ok(self
            .load_migrations()
            .await?
            .into_iter()
            .find(|migration| migration.id == id))
    }

    /// The most recent snapshot that records `table`
    pub async fn latest_snapshot(&self, table: &str) -> SchemaResult<Option<TableSchema>> {
        let migrations = self.load_migrations().await?;
        Ok(migrations
            .into_iter()
            .rev()
            .find_map(|migration| migration.snapshot.and_then(|mut s| s.remove(table))))
    }

    /// Parse a migration file into a Migration struct
    fn parse_migration_file(&self, path: &Path) -> SchemaResult<Migration> {
        let content = fs::read_to_string(path)?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SchemaError::Migration(format!("Invalid migration filename: {}", path.display())))?
            .to_string();

        let (created_at, name) = split_migration_id(&id).ok_or_else(|| {
            SchemaError::Migration(format!(
                "Migration filename '{}' must follow format: YYYYmmdd_HHMMSS_name",
                id
            ))
        })?;

        let (up_sql, down_sql) = parse_migration_content(&content);

        let snapshot_path = self.snapshot_path(&id);
        let snapshot = if snapshot_path.exists() {
            let json = fs::read_to_string(&snapshot_path)?;
            Some(serde_json::from_str::<SchemaSnapshot>(&json)?)
        } else {
            None
        };

        Ok(Migration {
            up_statements: split_sql_statements(&up_sql),
            down_statements: split_sql_statements(&down_sql),
            id,
            name,
            created_at,
            snapshot,
        })
    }

    fn write_migration(&self, migration: &Migration) -> SchemaResult<()> {
        fs::create_dir_all(&self.config.migrations_dir)?;

        let path = self.config.migrations_dir.join(format!("{}.sql", migration.id));
        if path.exists() {
            return Err(SchemaError::Migration(format!(
                "Migration {} already exists",
                migration.id
            )));
        }
        fs::write(&path, render_migration(migration))?;

        if let Some(snapshot) = &migration.snapshot {
            fs::write(
                self.snapshot_path(&migration.id),
                serde_json::to_string_pretty(snapshot)?,
            )?;
        }
        Ok(())
    }

    fn snapshot_path(&self, id: &str) -> std::path::PathBuf {
        self.config
            .migrations_dir
            .join(format!("{}{}", id, SNAPSHOT_SUFFIX))
    }

    /// Timestamp-based id, kept strictly after the newest existing migration
    fn next_id(&self, name: &str) -> SchemaResult<(String, DateTime<Utc>)> {
        let slug = name
            .trim()
            .to_lowercase()
            .replace(|c: char| !c.is_ascii_alphanumeric(), "_");
        if slug.trim_matches('_').is_empty() {
            return Err(SchemaError::Migration(format!("Invalid migration name '{}'", name)));
        }

        let mut created_at = Utc::now();
        let newest = fs::read_dir(&self.config.migrations_dir)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let stem = file_name.strip_suffix(".sql")?.to_string();
                split_migration_id(&stem).map(|(at, _)| at)
            })
            .max();
        if let Some(newest) = newest {
            if newest.timestamp() >= created_at.timestamp() {
                created_at = newest + Duration::seconds(1);
            }
        }

        Ok((
            format!("{}_{}", created_at.format(TIMESTAMP_FORMAT), slug),
            created_at,
        ))
    }
}

/// Split `YYYYmmdd_HHMMSS_name` into its timestamp and readable name
fn split_migration_id(id: &str) -> Option<(DateTime<Utc>, String)> {
    let stamp = id.get(..15)?;
    let rest = id.get(15..)?.strip_prefix('_')?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((
        DateTime::from_naive_utc_and_offset(naive, Utc),
        rest.replace('_', " "),
    ))
}

fn render_migration(migration: &Migration) -> String {
    let section = |statements: &[String]| {
        statements
            .iter()
            .map(|statement| format!("{};\n", statement))
            .collect::<String>()
    };
    format!(
        "-- Migration: {}\n-- Created: {}\n\n-- Up migration\n{}\n-- Down migration\n{}",
        migration.name,
        migration.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        section(&migration.up_statements),
        section(&migration.down_statements),
    )
}

/// Parse migration content to extract UP and DOWN SQL
const UP_MARKER: &str = "-- up migration";
const DOWN_MARKER: &str = "-- down migration";

fn parse_migration_content(content: &str) -> (String, String) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current: Option<&mut Vec<&str>> = None;

    for line in content.lines() {
        let trimmed = line.trim().to_lowercase();
        let marker = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");

        if marker == UP_MARKER {
            current = Some(&mut up_sql);
            continue;
        } else if marker == DOWN_MARKER {
            current = Some(&mut down_sql);
            continue;
        }

        // Skip comment lines and empty lines
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        if let Some(section) = current.as_mut() {
            section.push(line);
        }
    }

    (up_sql.join("\n"), down_sql.join("\n"))
}

/// Split a SQL script into statements at top-level semicolons
///
/// Uses the MySQL tokenizer so semicolons inside quoted strings, identifiers
/// and comments do not split. Statement text is kept verbatim. Falls back to
/// splitting on every `;` when the script does not tokenize.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let dialect = MySqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("SQL tokenizing failed, using naive statement splitting: {}", e);
            return naive_split(sql);
        }
    };

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut statements = Vec::new();
    let mut start = 0;
    for token in tokens {
        if token.token != Token::SemiColon {
            continue;
        }
        let Some(end) = byte_offset(sql, &line_starts, &token.location) else {
            tracing::warn!("SQL token location out of range, using naive statement splitting");
            return naive_split(sql);
        };
        push_statement(&mut statements, &sql[start..end]);
        start = end + 1;
    }
    push_statement(&mut statements, &sql[start.min(sql.len())..]);
    statements
}

fn byte_offset(sql: &str, line_starts: &[usize], location: &Location) -> Option<usize> {
    let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
    let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
    let start = *line_starts.get(line)?;
    let rest = sql.get(start..)?;
    rest.char_indices()
        .nth(column)
        .map(|(offset, _)| start + offset)
}

fn naive_split(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    for part in sql.split(';') {
        push_statement(&mut statements, part);
    }
    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    let statement = text.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
}
