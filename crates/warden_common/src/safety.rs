//! Safety Policy
//!
//! Read-only rules loaded once at startup:
//! - project root: every path must resolve inside it
//! - forbidden path prefixes (`*` stripped, case-insensitive)
//! - forbidden command substrings (case-insensitive)
//! - confirmation requirement, per-operation timeouts, output cap
//!
//! Checks are pure predicates returning a `SafetyDecision`. A rejected check
//! is a decision, not an error.

use crate::config::SecurityConfig;
use crate::error::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Shell metacharacters reported as observations
const SHELL_METACHARACTERS: &[char] = &['>', '<', '|'];

// =============================================================================
// Decisions
// =============================================================================

/// Rule that caused a rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyRule {
    OutsideProjectRoot,
    ForbiddenPath(String),
    ForbiddenCommand(String),
    InvalidPath,
}

impl fmt::Display for SafetyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyRule::OutsideProjectRoot => write!(f, "outside_project_root"),
            SafetyRule::ForbiddenPath(p) => write!(f, "forbidden_path:{}", p),
            SafetyRule::ForbiddenCommand(c) => write!(f, "forbidden_command:{}", c),
            SafetyRule::InvalidPath => write!(f, "invalid_path"),
        }
    }
}

/// Result of a safety check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDecision {
    pub is_allowed: bool,
    pub reason: String,
    /// Rule that fired, when rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<SafetyRule>,
    /// Non-blocking observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SafetyDecision {
    pub fn allowed(reason: &str) -> Self {
        Self {
            is_allowed: true,
            reason: reason.to_string(),
            rule: None,
            warnings: Vec::new(),
        }
    }

    pub fn blocked(reason: String, rule: SafetyRule) -> Self {
        Self {
            is_allowed: false,
            reason,
            rule: Some(rule),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Operations with their own timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Command,
    Python,
}

// =============================================================================
// Policy
// =============================================================================

/// Loaded security policy
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    project_root: PathBuf,
    forbidden_commands: Vec<String>,
    forbidden_paths: Vec<String>,
    require_confirmation: bool,
    command_timeout: Duration,
    python_timeout: Duration,
    max_output_length: usize,
}

impl SafetyPolicy {
    /// Build the policy from the `[security]` section.
    ///
    /// Fails when the project root cannot be resolved to an existing
    /// directory. Blank or non-string rule entries are skipped.
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let project_root = config.project_root.canonicalize().map_err(|e| {
            WardenError::Policy(format!(
                "Cannot resolve project root {}: {}",
                config.project_root.display(),
                e
            ))
        })?;

        if !project_root.is_dir() {
            return Err(WardenError::Policy(format!(
                "Project root is not a directory: {}",
                project_root.display()
            )));
        }

        Ok(Self {
            project_root,
            forbidden_commands: string_rules("forbidden_commands", &config.forbidden_commands),
            forbidden_paths: string_rules("forbidden_paths", &config.forbidden_paths),
            require_confirmation: config.require_confirmation,
            command_timeout: Duration::from_secs(config.timeout.command),
            python_timeout: Duration::from_secs(config.timeout.python),
            max_output_length: config.max_output_length,
        })
    }

    /// Canonical project root
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn requires_confirmation(&self) -> bool {
        self.require_confirmation
    }

    pub fn timeout_for(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Command => self.command_timeout,
            OperationKind::Python => self.python_timeout,
        }
    }

    pub fn max_output_length(&self) -> usize {
        self.max_output_length
    }

    pub fn forbidden_commands(&self) -> &[String] {
        &self.forbidden_commands
    }

    pub fn forbidden_paths(&self) -> &[String] {
        &self.forbidden_paths
    }

    /// Resolve a user path the same way `check_path` does.
    ///
    /// Relative paths join the project root. `.` and `..` are folded
    /// lexically, then the deepest existing ancestor is canonicalized and the
    /// rest appended.
    pub fn resolve_path(&self, path: &str) -> std::io::Result<PathBuf> {
        let raw = Path::new(path);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.project_root.join(raw)
        };
        resolve_existing_prefix(&normalize_lexically(&joined))
    }

    /// Validate a path against the project root and forbidden prefixes
    pub fn check_path(&self, path: &str) -> SafetyDecision {
        let resolved = match self.resolve_path(path) {
            Ok(p) => p,
            Err(e) => {
                return SafetyDecision::blocked(
                    format!("Error validating path: {}", e),
                    SafetyRule::InvalidPath,
                )
            }
        };

        if !resolved.starts_with(&self.project_root) {
            return SafetyDecision::blocked(
                format!(
                    "Path is outside project root: {}",
                    self.project_root.display()
                ),
                SafetyRule::OutsideProjectRoot,
            );
        }

        let lowered = resolved.to_string_lossy().to_lowercase();
        for pattern in &self.forbidden_paths {
            let prefix = pattern.replace('*', "").to_lowercase();
            if lowered.starts_with(&prefix) {
                return SafetyDecision::blocked(
                    format!("Path matches forbidden pattern: {}", pattern),
                    SafetyRule::ForbiddenPath(pattern.clone()),
                );
            }
        }

        SafetyDecision::allowed("Path is safe")
    }

    /// Validate a shell command against forbidden substrings
    pub fn check_command(&self, command: &str) -> SafetyDecision {
        let lowered = command.trim().to_lowercase();

        for word in &self.forbidden_commands {
            if lowered.contains(&word.to_lowercase()) {
                return SafetyDecision::blocked(
                    format!("Command contains forbidden operation: {}", word),
                    SafetyRule::ForbiddenCommand(word.clone()),
                );
            }
        }

        let warnings: Vec<String> = SHELL_METACHARACTERS
            .iter()
            .filter(|c| lowered.contains(**c))
            .map(|c| format!("Command uses shell metacharacter '{}'", c))
            .collect();

        SafetyDecision::allowed("Command is safe").with_warnings(warnings)
    }
}

/// Keep usable string rules, warn about the rest
fn string_rules(field: &str, values: &[toml::Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|value| match value {
            toml::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            other => {
                warn!("Skipping malformed security.{} entry: {}", field, other);
                None
            }
        })
        .collect()
}

/// Fold `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and append the remainder
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut remainder = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in remainder.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
