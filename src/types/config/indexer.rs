use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::ingest::{ExplorerConfig, ScannerConfig};
use crate::types::config::chain::ChainConfig;
use crate::types::config::contract::{resolve_contract_config, ContractConfig, ContractConfigRaw};

#[derive(Debug, Deserialize)]
pub struct IndexerConfigRaw {
    pub chain: ChainConfig,
    pub contract: ContractConfigRaw,
    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub checkpoint: CheckpointBackend,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScannerSettings {
    pub max_concurrent_blocks: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub block_timeout_secs: Option<u64>,
    pub contract_logs_only: Option<bool>,
    pub pin_balance_to_block: Option<bool>,
    pub receipt_concurrency: Option<usize>,
    /// Retries for a block the node answers as null
    pub null_block_retries: Option<u32>,
}

impl ScannerSettings {
    pub fn scanner_config(&self) -> ScannerConfig {
        let defaults = ScannerConfig::default();
        ScannerConfig {
            max_concurrent_blocks: self
                .max_concurrent_blocks
                .unwrap_or(defaults.max_concurrent_blocks),
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            block_timeout: self
                .block_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.block_timeout),
        }
    }

    pub fn explorer_config(&self) -> ExplorerConfig {
        let defaults = ExplorerConfig::default();
        let mut null_block_retry = defaults.null_block_retry;
        if let Some(retries) = self.null_block_retries {
            null_block_retry.max_retries = retries;
        }

        ExplorerConfig {
            contract_logs_only: self.contract_logs_only.unwrap_or(defaults.contract_logs_only),
            receipt_concurrency: self
                .receipt_concurrency
                .unwrap_or(defaults.receipt_concurrency),
            null_block_retry,
        }
    }

    pub fn pin_balance_to_block(&self) -> bool {
        self.pin_balance_to_block.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    pub url_env_var: Option<String>,
    pub migrations_dir: Option<String>,
    pub max_connections: Option<usize>,
}

impl DatabaseConfig {
    pub fn url_env_var(&self) -> &str {
        self.url_env_var.as_deref().unwrap_or("DATABASE_URL")
    }

    pub fn migrations_dir(&self) -> PathBuf {
        PathBuf::from(self.migrations_dir.as_deref().unwrap_or("migrations"))
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.unwrap_or(16)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug)]
pub struct IndexerConfig {
    pub chain: ChainConfig,
    pub contract: ContractConfig,
    pub scanner: ScannerSettings,
    pub database: DatabaseConfig,
    pub checkpoint: CheckpointBackend,
}

impl IndexerConfig {
    /// Reads the file, then applies overrides from the process environment.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let raw_config: IndexerConfigRaw = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        Ok(IndexerConfig {
            chain: raw_config.chain,
            contract: resolve_contract_config(raw_config.contract, base_dir)?,
            scanner: raw_config.scanner,
            database: raw_config.database,
            checkpoint: raw_config.checkpoint,
        })
    }

    /// `MAX_CONCURRENT_BLOCKS` and `POLL_INTERVAL_MS` take precedence over the file.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(value) = lookup("MAX_CONCURRENT_BLOCKS") {
            let parsed = value
                .parse()
                .with_context(|| format!("MAX_CONCURRENT_BLOCKS is not a number: {}", value))?;
            self.scanner.max_concurrent_blocks = Some(parsed);
        }
        if let Some(value) = lookup("POLL_INTERVAL_MS") {
            let parsed = value
                .parse()
                .with_context(|| format!("POLL_INTERVAL_MS is not a number: {}", value))?;
            self.scanner.poll_interval_ms = Some(parsed);
        }
        Ok(())
    }
}
