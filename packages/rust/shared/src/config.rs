//! Application configuration for the harvester.
//!
//! User config lives at `~/.harvester/harvester.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::{HarvesterError, Result};
use crate::types::{DirectoryDescriptor, SearchEngineDescriptor};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "harvester.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".harvester";

// ---------------------------------------------------------------------------
// Config structs (matching harvester.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub collector: CollectorSection,

    #[serde(default)]
    pub extractor: ExtractorSection,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Source overrides. Empty lists fall back to the built-in catalog.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the `raw/` and `processed/` artifact trees.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// libSQL database file backing the directory.
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            database: default_database(),
        }
    }
}

impl PathsConfig {
    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    pub fn database(&self) -> PathBuf {
        expand_home(&self.database)
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_database() -> String {
    "./output/directory.db".into()
}

/// `[collector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSection {
    /// Pause after each (location, keyword) cell.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Pause after each search against one source.
    #[serde(default = "default_source_delay")]
    pub source_delay_ms: u64,

    /// Pause after each company page fetch.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Write a checkpoint after this many processed locations.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    #[serde(default = "default_keywords_per_location")]
    pub keywords_per_location: usize,

    /// Search-engine links followed per keyword.
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    /// Locations covered by an incremental run.
    #[serde(default = "default_incremental_locations")]
    pub incremental_locations: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
            source_delay_ms: default_source_delay(),
            page_delay_ms: default_page_delay(),
            checkpoint_every: default_checkpoint_every(),
            keywords_per_location: default_keywords_per_location(),
            max_search_results: default_max_search_results(),
            incremental_locations: default_incremental_locations(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_delay() -> u64 {
    1000
}
fn default_source_delay() -> u64 {
    2000
}
fn default_page_delay() -> u64 {
    1000
}
fn default_checkpoint_every() -> usize {
    10
}
fn default_keywords_per_location() -> usize {
    20
}
fn default_max_search_results() -> usize {
    5
}
fn default_incremental_locations() -> usize {
    50
}
fn default_request_timeout() -> u64 {
    30
}

/// `[extractor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSection {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Page text is truncated to this many characters before extraction.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_extractor_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ExtractorSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_extractor_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_extractor_timeout() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    1000
}

/// A weekly fire time (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

/// A daily fire time (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySlot {
    pub hour: u32,
    pub minute: u32,
}

/// `[schedule]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_full_cycle")]
    pub full_cycle: WeeklySlot,

    #[serde(default = "default_incremental")]
    pub incremental: DailySlot,

    #[serde(default = "default_maintenance")]
    pub maintenance: DailySlot,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            full_cycle: default_full_cycle(),
            incremental: default_incremental(),
            maintenance: default_maintenance(),
        }
    }
}

fn default_full_cycle() -> WeeklySlot {
    WeeklySlot {
        weekday: Weekday::Sun,
        hour: 2,
        minute: 0,
    }
}
fn default_incremental() -> DailySlot {
    DailySlot { hour: 6, minute: 0 }
}
fn default_maintenance() -> DailySlot {
    DailySlot { hour: 8, minute: 0 }
}

/// `[sources]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<SearchEngineDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<DirectoryDescriptor>,
}

impl SourcesConfig {
    /// Configured search engines, or the built-in set.
    pub fn search_engines(&self) -> Vec<SearchEngineDescriptor> {
        if self.search.is_empty() {
            catalog::search_engines()
        } else {
            self.search.clone()
        }
    }

    /// Configured directories, or the built-in set.
    pub fn directories(&self) -> Vec<DirectoryDescriptor> {
        if self.directories.is_empty() {
            catalog::directories()
        } else {
            self.directories.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from the file config)
// ---------------------------------------------------------------------------

/// Runtime collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub request_delay_ms: u64,
    pub source_delay_ms: u64,
    pub page_delay_ms: u64,
    pub checkpoint_every: usize,
    pub keywords: Vec<String>,
    pub max_search_results: usize,
    pub request_timeout_secs: u64,
}

impl From<&AppConfig> for CollectorConfig {
    fn from(config: &AppConfig) -> Self {
        let c = &config.collector;
        Self {
            request_delay_ms: c.request_delay_ms,
            source_delay_ms: c.source_delay_ms,
            page_delay_ms: c.page_delay_ms,
            checkpoint_every: c.checkpoint_every.max(1),
            keywords: catalog::KEYWORDS
                .iter()
                .take(c.keywords_per_location)
                .map(|k| k.to_string())
                .collect(),
            max_search_results: c.max_search_results,
            request_timeout_secs: c.request_timeout_secs,
        }
    }
}

/// Runtime extractor configuration with the API key resolved.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_input_chars: usize,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ExtractorConfig {
    /// Resolve the runtime config, reading the API key from the configured env var.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self::from_app_with_key(config, &resolve_api_key(config)?))
    }

    /// Build the runtime config with an explicit key.
    pub fn from_app_with_key(config: &AppConfig, api_key: &str) -> Self {
        let e = &config.extractor;
        Self {
            api_key: api_key.to_string(),
            model: e.model.clone(),
            base_url: e.base_url.clone(),
            max_input_chars: e.max_input_chars,
            timeout_secs: e.timeout_secs,
            temperature: e.temperature,
            max_tokens: e.max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.harvester/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvesterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.harvester/harvester.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvesterError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvesterError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvesterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvesterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvesterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the extraction API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.extractor.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(HarvesterError::config(format!(
            "extraction API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
