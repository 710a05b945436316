use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::urls::UrlTable;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub batch: BatchConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub target: TargetConfig,
    pub urls: Vec<UrlConfig>,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch.name.trim().is_empty() {
            anyhow::bail!("batch.name cannot be empty");
        }
        if self.batch.workers == 0 {
            anyhow::bail!("batch.workers must be at least 1");
        }
        if self.reporting.interval_ms == 0 {
            anyhow::bail!("reporting.interval_ms must be positive");
        }
        if self.urls.is_empty() {
            anyhow::bail!("at least one [[urls]] entry is required");
        }
        Ok(())
    }

    /// URL table in configuration order.
    pub fn url_table(&self) -> UrlTable {
        UrlTable::new(
            self.urls
                .iter()
                .map(|u| (u.url.clone(), u.short_name().to_string())),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Batch identifier; names the statistics, opstats and client dump files
    pub name: String,
    /// Virtual clients spread over all workers
    pub clients_max: u64,
    /// Number of worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Optional run duration cap in milliseconds
    pub duration_ms: Option<u64>,
}

fn default_workers() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Time between statistics ticks in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Directory receiving the batch files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Write `<batch>.txt`
    #[serde(default = "default_true")]
    pub statistics_file: bool,
    /// Write `<batch>.ops`
    #[serde(default)]
    pub dump_opstats: bool,
    /// Emit a JSON document per tick on stdout
    #[serde(default = "default_true")]
    pub json: bool,
    /// Write `<batch>.ctx` at shutdown
    #[serde(default = "default_true")]
    pub dump_clients: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            output_dir: default_output_dir(),
            statistics_file: true,
            dump_opstats: false,
            json: true,
            dump_clients: true,
        }
    }
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlConfig {
    pub url: String,
    /// Label used in reports; falls back to the URL itself
    #[serde(default)]
    pub short_name: Option<String>,
}

impl UrlConfig {
    pub fn short_name(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.url)
    }
}
