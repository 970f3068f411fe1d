//! Toolkit configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ying_core::{PlogOptions, ReportColumns, DEFAULT_API_BASE};
use ying_types::DisplayMode;

pub const BOT_TOKEN_ENV: &str = "YING_TG_BOT_TOKEN";
pub const CHAT_ID_ENV: &str = "YING_TG_CHAT_ID";
pub const PROJECT_ID_ENV: &str = "YING_GOOGLE_PROJECT_ID";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub plog: PlogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlogConfig {
    #[serde(default = "default_append_cadence_ms")]
    pub append_cadence_ms: u64,
    #[serde(default = "default_replace_cadence_ms")]
    pub replace_cadence_ms: u64,
    #[serde(default = "default_flush_on_exit")]
    pub flush_on_exit: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub google_project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_sheet_path")]
    pub sheet_path: PathBuf,
    #[serde(default = "default_bucket_column")]
    pub bucket_column: String,
    #[serde(default = "default_bytes_column")]
    pub bytes_column: String,
    #[serde(default = "default_count_column")]
    pub count_column: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_append_cadence_ms() -> u64 {
    3000
}

fn default_replace_cadence_ms() -> u64 {
    1000
}

fn default_flush_on_exit() -> bool {
    true
}

fn default_sheet_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ying")
        .join("buckets.json")
}

fn default_bucket_column() -> String {
    "bucket".to_string()
}

fn default_bytes_column() -> String {
    "bytes".to_string()
}

fn default_count_column() -> String {
    "count".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_api_base(),
        }
    }
}

impl Default for PlogConfig {
    fn default() -> Self {
        Self {
            append_cadence_ms: default_append_cadence_ms(),
            replace_cadence_ms: default_replace_cadence_ms(),
            flush_on_exit: default_flush_on_exit(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sheet_path: default_sheet_path(),
            bucket_column: default_bucket_column(),
            bytes_column: default_bytes_column(),
            count_column: default_count_column(),
        }
    }
}

impl PlogConfig {
    pub fn options(&self, mode: DisplayMode) -> PlogOptions {
        PlogOptions {
            mode,
            append_cadence: Duration::from_millis(self.append_cadence_ms),
            replace_cadence: Duration::from_millis(self.replace_cadence_ms),
            flush_on_exit: self.flush_on_exit,
        }
    }
}

impl ReportConfig {
    pub fn columns(&self) -> ReportColumns {
        ReportColumns {
            bucket: self.bucket_column.clone(),
            bytes: self.bytes_column.clone(),
            count: self.count_column.clone(),
        }
    }
}

/// Default config file location (`<config_dir>/ying/config.toml`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ying")
        .join("config.toml")
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load config from the default location or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = default_config_path();
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    /// Apply `YING_*` environment overrides.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty(BOT_TOKEN_ENV) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = non_empty(CHAT_ID_ENV) {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(project) = non_empty(PROJECT_ID_ENV) {
            self.storage.google_project_id = Some(project);
        }
    }
}
