use serde::{Deserialize, Serialize};

/// Tuning for copy-swap rewrites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Rows per copy batch
    pub batch_size: u64,
    /// Appended to the table name for the shadow table
    pub shadow_suffix: String,
    /// Appended to the table name for the replaced original
    pub old_suffix: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            shadow_suffix: "__shadow".to_string(),
            old_suffix: "__old".to_string(),
        }
    }
}

impl TransformOptions {
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }
}
