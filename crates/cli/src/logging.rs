//! Logging setup for the CLI
//!
//! `RUST_LOG` wins over the configured level when set.

use std::io;

use serde::Deserialize;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the tidemark CLI
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Include file and line number information
    pub include_location: bool,
    /// Environment filter (supports filters like "tidemark_schema=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Set the level and keep driver chatter down
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self.env_filter = Some(format!("{},sqlx=warn", level));
        self
    }

    fn filter(&self) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
        let directives = self.env_filter.as_deref().unwrap_or(&self.level);
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directives))
    }
}

/// Initialize logging to stderr, keeping stdout for command output
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = config.filter()?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .json(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()?;
    }

    tracing::debug!(
        target: "tidemark::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_adds_driver_filter() {
        let config = LoggingConfig::default().with_level("debug");
        assert_eq!(config.env_filter.as_deref(), Some("debug,sqlx=warn"));
        assert!(!config.json_format);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: LoggingConfig = serde_json::from_str(r#"{"json_format": true}"#).unwrap();
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }
}
