//! Command Executor
//!
//! Runs shell commands and Python snippets as child processes with a hard
//! timeout. The executor owns a current-thread tokio runtime so callers stay
//! synchronous; the child is spawned with `kill_on_drop`, so an expired
//! timeout also kills the process.
//!
//! Outcomes are reported, never interpreted: a non-zero exit is a failed
//! `CommandResult`, not an error.

use crate::error::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::debug;

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    NonZeroExit,
    CommandNotFound,
    PermissionDenied,
    Timeout,
    OsError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZeroExit => "non-zero exit",
            Self::CommandNotFound => "command not found",
            Self::PermissionDenied => "permission denied",
            Self::Timeout => "timeout",
            Self::OsError => "OS error",
        }
    }
}

/// Result of one child process run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, -1 when the process never finished normally
    pub return_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ExecutionStatus,
    pub duration_ms: u64,
}

impl CommandResult {
    fn failed(status: ExecutionStatus, error: String, started: Instant) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            return_code: -1,
            error: Some(error),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Best single-line explanation of a failure
    pub fn failure_message(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.return_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Cut `text` to `max_chars` characters and append the truncation marker
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n... (truncated, {} chars total)", kept, total)
}

/// Child process runner
pub struct CommandExecutor {
    runtime: Runtime,
    working_dir: PathBuf,
    python: String,
    max_output_length: usize,
}

impl CommandExecutor {
    pub fn new(working_dir: &Path, python: &str, max_output_length: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WardenError::Runtime(format!("Failed to start process runtime: {}", e)))?;

        Ok(Self {
            runtime,
            working_dir: working_dir.to_path_buf(),
            python: python.to_string(),
            max_output_length,
        })
    }

    /// Run a shell command in `cwd`
    pub fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> CommandResult {
        let mut cmd = shell_command(command);
        cmd.current_dir(cwd);
        self.run_child(cmd, timeout)
    }

    /// Run a Python snippet with the configured interpreter
    pub fn run_python(&self, code: &str, timeout: Duration) -> CommandResult {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c").arg(code).current_dir(&self.working_dir);
        self.run_child(cmd, timeout)
    }

    fn run_child(&self, mut cmd: Command, timeout: Duration) -> CommandResult {
        let started = Instant::now();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Spawning registers the child with the runtime's reactor
        let waited = self.runtime.block_on(async {
            let child = cmd.spawn()?;
            Ok::<_, io::Error>(tokio::time::timeout(timeout, child.wait_with_output()).await)
        });

        let waited = match waited {
            Ok(waited) => waited,
            Err(e) => {
                return CommandResult::failed(
                    status_for_io_error(&e),
                    format!("Failed to start process: {}", e),
                    started,
                )
            }
        };

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return CommandResult::failed(
                    status_for_io_error(&e),
                    format!("Failed to collect output: {}", e),
                    started,
                )
            }
            Err(_) => {
                debug!("Child process exceeded {:?}, killed", timeout);
                return CommandResult::failed(
                    ExecutionStatus::Timeout,
                    format!("Command timed out after {} seconds", timeout.as_secs()),
                    started,
                );
            }
        };

        let return_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        let limit = self.max_output_length;
        CommandResult {
            success,
            stdout: truncate_output(&String::from_utf8_lossy(&output.stdout), limit),
            stderr: truncate_output(&String::from_utf8_lossy(&output.stderr), limit),
            return_code,
            error: None,
            status: if success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::NonZeroExit
            },
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn status_for_io_error(e: &io::Error) -> ExecutionStatus {
    match e.kind() {
        io::ErrorKind::NotFound => ExecutionStatus::CommandNotFound,
        io::ErrorKind::PermissionDenied => ExecutionStatus::PermissionDenied,
        _ => ExecutionStatus::OsError,
    }
}
