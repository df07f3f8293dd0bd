pub mod migrate;
pub mod table;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use tidemark_schema::{Database, MigrationConfig, MySqlHandle};

/// Options shared by every command
pub struct Context {
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
}

impl Context {
    pub fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            migrations_dir: self.migrations_dir.clone(),
            ..Default::default()
        }
    }

    pub async fn connect(&self) -> anyhow::Result<Arc<dyn Database>> {
        let url = self
            .database_url
            .as_deref()
            .context("No database configured; pass --database-url or set DATABASE_URL")?;
        let handle = MySqlHandle::connect(url)
            .await
            .context("Failed to connect to the database")?;
        Ok(Arc::new(handle))
    }
}
