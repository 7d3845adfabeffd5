//! Configuration loading.
//!
//! Reads `~/.solvesync/config.toml`. Every section is optional; a missing file
//! yields defaults so a fresh install works without setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SolveError};

/// Run failures that latch the analysis request.
pub const DEFAULT_RUN_FAILURE_THRESHOLD: u32 = 2;
/// Cumulative submit failures that latch the analysis request.
pub const DEFAULT_SUBMIT_FAILURE_THRESHOLD: u32 = 3;
/// Captured code at or below this many characters is treated as noise.
pub const DEFAULT_MIN_CODE_LENGTH: usize = 10;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_PLATFORM_TAG: &str = "leetcode";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolveConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub code_host: CodeHostConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub run_failure_threshold: u32,
    pub submit_failure_threshold: u32,
    pub min_code_length: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            run_failure_threshold: DEFAULT_RUN_FAILURE_THRESHOLD,
            submit_failure_threshold: DEFAULT_SUBMIT_FAILURE_THRESHOLD,
            min_code_length: DEFAULT_MIN_CODE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub refresh_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

impl TimerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
}

impl AnalysisConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodeHostConfig {
    pub enabled: bool,
    pub platform_tag: String,
}

impl Default for CodeHostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            platform_tag: DEFAULT_PLATFORM_TAG.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

/// Returns the path to the solvesync directory (~/.solvesync).
pub fn get_solvesync_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".solvesync"))
}

pub fn default_config_path() -> Result<PathBuf> {
    get_solvesync_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or_else(|| SolveError::ConfigurationMissing("home directory not found".to_string()))
}

/// Store file location: explicit config value, else `~/.solvesync/records.json`.
pub fn resolve_store_path(config: &SolveConfig) -> Result<PathBuf> {
    if let Some(path) = &config.store.path {
        return Ok(path.clone());
    }
    get_solvesync_dir()
        .map(|dir| dir.join("records.json"))
        .ok_or_else(|| SolveError::ConfigurationMissing("home directory not found".to_string()))
}

pub fn load_config(path: Option<PathBuf>) -> Result<SolveConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config file; using defaults");
        return Ok(SolveConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| SolveError::Io {
        context: format!("reading config {}", config_path.display()),
        source: err,
    })?;
    parse_config(&config_path, &content)
}

fn parse_config(path: &Path, content: &str) -> Result<SolveConfig> {
    toml::from_str::<SolveConfig>(content).map_err(|err| SolveError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}
