use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use super::handlers::StrategyConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Environment variable holding the PostgreSQL connection string.
    #[serde(default = "default_database_url_env_var")]
    pub database_url_env_var: String,

    /// Maximum number of handlers of one batch running at the same time.
    #[serde(default = "default_handler_concurrency")]
    pub handler_concurrency: usize,

    /// Apply a block through `ender_block_processor` when every handler in
    /// it uses the atomic strategy.
    #[serde(default)]
    pub use_block_processor_procedure: bool,

    #[serde(default)]
    pub strategies: StrategyConfig,

    /// Newline-delimited JSON blocks. Reads stdin when absent.
    #[serde(default)]
    pub blocks_path: Option<PathBuf>,

    /// Where published output events are appended as JSON lines. Stdout when absent.
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    /// Write sequential-strategy timings to this CSV file instead of the log.
    #[serde(default)]
    pub timing_csv_path: Option<PathBuf>,
}

fn default_database_url_env_var() -> String {
    "DATABASE_URL".to_string()
}

fn default_handler_concurrency() -> usize {
    4
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            database_url_env_var: default_database_url_env_var(),
            handler_concurrency: default_handler_concurrency(),
            use_block_processor_procedure: false,
            strategies: StrategyConfig::default(),
            blocks_path: None,
            output_path: None,
            timing_csv_path: None,
        }
    }
}

impl IndexerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let config: IndexerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.handler_concurrency > 0,
            "handler_concurrency must be at least 1"
        );

        Ok(config)
    }
}
