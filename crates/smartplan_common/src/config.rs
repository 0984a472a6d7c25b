//! SmartPlan Configuration
//!
//! Configuration lives in a TOML file (default `./smartplan.toml`). Every
//! field has a default, so an empty or missing file is a valid setup.
//!
//! ```toml
//! [backend]
//! model = "gpt-4"
//! api_key_file = "api_key"
//!
//! [budgets]
//! allocation = 800
//!
//! [retry]
//! max_attempts = 3
//! ```

use crate::backend::{Backend, BackendFamily};
use crate::error::PlanError;
use crate::llm_client::LlmConfig;
use crate::pipeline::StageBudgets;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "smartplan.toml";

/// Environment variable that overrides the API key file
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Backend identifier sent as the model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Overrides the family derived from the model identifier
    #[serde(default)]
    pub family: Option<BackendFamily>,

    /// File holding the API key; `.txt` is appended when missing
    #[serde(default = "default_api_key_file")]
    pub api_key_file: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_key_file() -> String {
    "api_key".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            family: None,
            api_key_file: default_api_key_file(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn backend(&self) -> Backend {
        match self.family {
            Some(family) => Backend::with_family(self.model.clone(), family),
            None => Backend::from_id(self.model.clone()),
        }
    }

    pub fn key_file_path(&self) -> PathBuf {
        if self.api_key_file.ends_with(".txt") {
            PathBuf::from(&self.api_key_file)
        } else {
            PathBuf::from(format!("{}.txt", self.api_key_file))
        }
    }

    /// Environment first, then the key file. A missing file is not an error:
    /// local backends run without a key.
    pub fn resolve_api_key(&self) -> Result<Option<String>, PlanError> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(Some(key.trim().to_string()));
            }
        }
        read_key_file(&self.key_file_path())
    }

    pub fn llm_config(&self) -> Result<LlmConfig, PlanError> {
        Ok(LlmConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.resolve_api_key()?,
            timeout_secs: self.timeout_secs,
        })
    }
}

/// Read and trim a key file; `Ok(None)` when it does not exist
pub fn read_key_file(path: &Path) -> Result<Option<String>, PlanError> {
    if !path.exists() {
        debug!(path = %path.display(), "no API key file");
        return Ok(None);
    }
    let key = fs::read_to_string(path)?.trim().to_string();
    if key.is_empty() {
        return Err(PlanError::Config(format!("API key file {} is empty", path.display())));
    }
    Ok(Some(key))
}

/// Input data locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_decompose_set")]
    pub decompose_set: String,

    #[serde(default = "default_allocation_set")]
    pub allocation_set: String,

    #[serde(default = "default_test_set")]
    pub test_set: String,

    /// Scene snapshots; defaults to `<dir>/scenes`
    #[serde(default)]
    pub scenes_dir: Option<PathBuf>,

    /// JSON robot catalogue replacing the built-in one
    #[serde(default)]
    pub robots_file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_decompose_set() -> String {
    "train_task_decompose".to_string()
}

fn default_allocation_set() -> String {
    "train_task_allocation".to_string()
}

fn default_test_set() -> String {
    "final_test".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            decompose_set: default_decompose_set(),
            allocation_set: default_allocation_set(),
            test_set: default_test_set(),
            scenes_dir: None,
            robots_file: None,
        }
    }
}

impl DataConfig {
    /// Example corpus directory
    pub fn plans_dir(&self) -> PathBuf {
        self.dir.join("pythonic_plans")
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.scenes_dir.clone().unwrap_or_else(|| self.dir.join("scenes"))
    }
}

/// Artifact output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    #[serde(default = "default_log_results")]
    pub log_results: bool,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_results() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            log_results: default_log_results(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub budgets: StageBudgets,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

impl PlannerConfig {
    /// Load from an explicit path, else `./smartplan.toml` if present, else defaults.
    /// An explicit path that is missing or invalid is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, PlanError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load_from(default_path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self, PlanError> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlanError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| PlanError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self, PlanError> {
        toml::from_str(content).map_err(|e| PlanError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, PlanError> {
        toml::to_string_pretty(self).map_err(|e| PlanError::Config(e.to_string()))
    }
}
