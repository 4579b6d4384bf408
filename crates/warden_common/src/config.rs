//! Warden Configuration
//!
//! Config file lookup order:
//! 1. Explicit path (`--config`)
//! 2. `$WARDEN_CONFIG`
//! 3. `./config/warden.toml`
//! 4. `~/.config/warden/config.toml`
//! 5. Defaults
//!
//! Security rule lists are kept as raw TOML values here. The safety policy
//! decides which entries are usable so that one malformed rule does not
//! abort the whole load.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at a config file
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Project-local config path
pub const LOCAL_CONFIG_PATH: &str = "config/warden.toml";

/// Completion backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token for OpenAI-compatible endpoints
    #[serde(default)]
    pub api_key: Option<String>,

    /// HTTP timeout for one completion call
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub do_sample: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_model_timeout(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            do_sample: false,
        }
    }
}

/// Per-operation timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_op_timeout")]
    pub command: u64,

    #[serde(default = "default_op_timeout")]
    pub python: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command: default_op_timeout(),
            python: default_op_timeout(),
        }
    }
}

/// Security rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Case-insensitive substrings that block a command
    #[serde(default = "default_forbidden_commands")]
    pub forbidden_commands: Vec<toml::Value>,

    /// Prefix patterns; `*` is stripped before comparison
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<toml::Value>,

    #[serde(default = "default_true")]
    pub require_confirmation: bool,

    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,

    #[serde(default)]
    pub timeout: TimeoutConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            forbidden_commands: default_forbidden_commands(),
            forbidden_paths: default_forbidden_paths(),
            require_confirmation: true,
            max_output_length: default_max_output_length(),
            timeout: TimeoutConfig::default(),
        }
    }
}

/// File operator limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default)]
    pub show_hidden: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            show_hidden: false,
        }
    }
}

/// Child process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Interpreter used for `run_python`
    #[serde(default = "default_python")]
    pub python: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
        }
    }
}

/// Audit log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: default_log_file(),
        }
    }
}

/// Main Warden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Get user config path: ~/.config/warden/config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("warden").join("config.toml"))
    }

    /// Resolve which config file to read, if any
    pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_PATH);
        if local.exists() {
            return Some(local);
        }

        Self::user_config_path().filter(|p| p.exists())
    }

    /// Load configuration
    ///
    /// An explicitly named file that is missing or unparsable is an error.
    /// With no file anywhere, defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match Self::discover(explicit) {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: WardenConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Serialize to TOML (used by `wardenctl config`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_model_timeout() -> u64 {
    120
}

fn default_max_new_tokens() -> u32 {
    200
}

fn default_temperature() -> f32 {
    0.1
}

fn default_op_timeout() -> u64 {
    30
}

fn default_max_output_length() -> usize {
    5000
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_forbidden_commands() -> Vec<toml::Value> {
    ["format", "del /s", "rm -rf", "shutdown", "mkfs", "reg delete"]
        .iter()
        .map(|s| toml::Value::String(s.to_string()))
        .collect()
}

fn default_forbidden_paths() -> Vec<toml::Value> {
    ["C:\\Windows*", "C:\\Program Files*", "/etc*", "/boot*", "/sys*", "/proc*"]
        .iter()
        .map(|s| toml::Value::String(s.to_string()))
        .collect()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_python() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("config/logs/agent_log.txt")
}
