//! Runtime configuration for the savings client.
//!
//! Values are resolved in three layers: built-in defaults, an optional YAML
//! file named by `SAVINGS_CONFIG`, then individual `SAVINGS_*` environment
//! variables. Call `dotenvy::dotenv()` first if a `.env` file should count.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

pub const CONFIG_FILE_ENV: &str = "SAVINGS_CONFIG";
pub const API_URL_ENV: &str = "SAVINGS_API_URL";
pub const REFETCH_DELAY_ENV: &str = "SAVINGS_REFETCH_DELAY_MS";
pub const POLL_INTERVAL_ENV: &str = "SAVINGS_POLL_INTERVAL_MS";
pub const REQUEST_TIMEOUT_ENV: &str = "SAVINGS_REQUEST_TIMEOUT_MS";
pub const DATA_DIR_ENV: &str = "SAVINGS_DATA_DIR";

/// Marker left in deployment URLs that were never filled in
pub const PLACEHOLDER_SCRIPT_ID: &str = "YOUR_SCRIPT_ID";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Single endpoint of the spreadsheet API
    pub api_url: String,
    /// Wait before re-reading after a successful write
    pub refetch_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Rows in the dashboards' recent activity list
    pub recent_limit: usize,
    /// Where `session.json` lives
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            refetch_delay_ms: 3000,
            poll_interval_ms: 30_000,
            request_timeout_ms: 15_000,
            recent_limit: shared::aggregate::DEFAULT_RECENT_LIMIT,
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("school-savings")
}

impl ClientConfig {
    /// Defaults, then the YAML file from `SAVINGS_CONFIG`, then env overrides
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;

        info!(
            "Loaded client config (api configured: {}, data dir: {})",
            config.is_api_configured(),
            config.data_dir.display()
        );
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply `SAVINGS_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV) {
            self.api_url = url.trim().to_string();
        }
        if let Some(ms) = parse_millis(&lookup, REFETCH_DELAY_ENV)? {
            self.refetch_delay_ms = ms;
        }
        if let Some(ms) = parse_millis(&lookup, POLL_INTERVAL_ENV)? {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = parse_millis(&lookup, REQUEST_TIMEOUT_ENV)? {
            self.request_timeout_ms = ms;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir.trim());
        }
        Ok(())
    }

    /// False for an empty URL or one still carrying the deployment placeholder
    pub fn is_api_configured(&self) -> bool {
        let url = self.api_url.trim();
        !url.is_empty() && !url.contains(PLACEHOLDER_SCRIPT_ID)
    }

    pub fn refetch_delay(&self) -> Duration {
        Duration::from_millis(self.refetch_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(crate::storage::SESSION_FILE_NAME)
    }
}

fn parse_millis<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            let ms = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a whole number of milliseconds, got '{}'", key, raw))?;
            debug!("{} overridden to {}ms", key, ms);
            Ok(Some(ms))
        }
        _ => Ok(None),
    }
}
