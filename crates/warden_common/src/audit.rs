//! Audit Log
//!
//! Append-only, human-readable record of one session: recognized intents,
//! safety decisions, confirmations, execution outcomes and errors.
//!
//! File layout:
//! ```text
//! ================================================================================
//! AI Agent Operation Log
//! Started: 2026-01-01 12:00:00
//! Session: 7d1f...
//! ================================================================================
//!
//! [2026-01-01 12:00:03] INTENT
//! User Input: run dir
//! ...
//! --------------------------------------------------------------------------------
//! ```
//!
//! The header is written only when the file is created. Free text is passed
//! through `sanitize_for_audit` before it reaches disk. A failed write is
//! logged and skipped; it never fails the turn.

use crate::config::LoggingConfig;
use crate::error::Result;
use crate::intent::Intent;
use crate::router::ExecutionOutcome;
use crate::safety::SafetyDecision;
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::warn;

const HEAVY_RULE_WIDTH: usize = 80;

/// Characters of command output or file content kept per entry
pub const OUTPUT_EXCERPT_CHARS: usize = 200;

/// Characters kept after redaction
const SANITIZE_MAX_CHARS: usize = 1000;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Entries
// =============================================================================

/// What a safety check looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Path,
    Command,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Path => "path",
            CheckKind::Command => "command",
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    IntentRecognized {
        timestamp: DateTime<Local>,
        user_input: String,
        intent: String,
        parameters: Map<String, Value>,
        confidence: f64,
    },
    SafetyChecked {
        timestamp: DateTime<Local>,
        check: CheckKind,
        target: String,
        decision: SafetyDecision,
    },
    UserConfirmed {
        timestamp: DateTime<Local>,
        action: String,
        confirmed: bool,
    },
    Executed {
        timestamp: DateTime<Local>,
        tool: String,
        parameters: Map<String, Value>,
        outcome: ExecutionOutcome,
    },
    ErrorOccurred {
        timestamp: DateTime<Local>,
        component: String,
        error: String,
    },
    SessionEnded {
        timestamp: DateTime<Local>,
    },
}

impl AuditEntry {
    pub fn intent(user_input: &str, intent: &Intent) -> Self {
        AuditEntry::IntentRecognized {
            timestamp: Local::now(),
            user_input: user_input.to_string(),
            intent: intent.name().to_string(),
            parameters: intent.parameters(),
            confidence: intent.confidence,
        }
    }

    pub fn safety(check: CheckKind, target: &str, decision: &SafetyDecision) -> Self {
        AuditEntry::SafetyChecked {
            timestamp: Local::now(),
            check,
            target: target.to_string(),
            decision: decision.clone(),
        }
    }

    pub fn confirmation(action: &str, confirmed: bool) -> Self {
        AuditEntry::UserConfirmed {
            timestamp: Local::now(),
            action: action.to_string(),
            confirmed,
        }
    }

    pub fn execution(
        tool: &str,
        parameters: Map<String, Value>,
        outcome: &ExecutionOutcome,
    ) -> Self {
        AuditEntry::Executed {
            timestamp: Local::now(),
            tool: tool.to_string(),
            parameters,
            outcome: outcome.clone(),
        }
    }

    pub fn error(component: &str, error: &str) -> Self {
        AuditEntry::ErrorOccurred {
            timestamp: Local::now(),
            component: component.to_string(),
            error: error.to_string(),
        }
    }

    pub fn session_end() -> Self {
        AuditEntry::SessionEnded {
            timestamp: Local::now(),
        }
    }

    pub fn timestamp(&self) -> &DateTime<Local> {
        match self {
            AuditEntry::IntentRecognized { timestamp, .. }
            | AuditEntry::SafetyChecked { timestamp, .. }
            | AuditEntry::UserConfirmed { timestamp, .. }
            | AuditEntry::Executed { timestamp, .. }
            | AuditEntry::ErrorOccurred { timestamp, .. }
            | AuditEntry::SessionEnded { timestamp } => timestamp,
        }
    }

    /// Label used in the text log
    pub fn label(&self) -> &'static str {
        match self {
            AuditEntry::IntentRecognized { .. } => "INTENT",
            AuditEntry::SafetyChecked { .. } => "SAFETY CHECK",
            AuditEntry::UserConfirmed { .. } => "USER CONFIRMATION",
            AuditEntry::Executed { .. } => "EXECUTION",
            AuditEntry::ErrorOccurred { .. } => "ERROR",
            AuditEntry::SessionEnded { .. } => "SESSION END",
        }
    }

    /// Text block as written to the log file
    pub fn render(&self) -> String {
        let ts = self.timestamp().format(TIMESTAMP_FORMAT);

        if let AuditEntry::SessionEnded { .. } = self {
            return format!(
                "\n{heavy}\nSession Ended: {ts}\n{heavy}\n\n",
                heavy = "=".repeat(HEAVY_RULE_WIDTH),
                ts = ts
            );
        }

        let mut lines = vec![format!("[{}] {}", ts, self.label())];

        match self {
            AuditEntry::IntentRecognized {
                user_input,
                intent,
                parameters,
                confidence,
                ..
            } => {
                lines.push(format!("User Input: {}", sanitize_for_audit(user_input)));
                lines.push(format!("Recognized Intent: {}", intent));
                lines.push(format!("Parameters: {}", render_parameters(parameters)));
                lines.push(format!("Confidence: {:.2}", confidence));
            }
            AuditEntry::SafetyChecked {
                check,
                target,
                decision,
                ..
            } => {
                lines.push(format!("Type: {}", check.as_str()));
                lines.push(format!("Target: {}", sanitize_for_audit(target)));
                lines.push(format!(
                    "Status: {}",
                    if decision.is_allowed { "✓ SAFE" } else { "✗ UNSAFE" }
                ));
                lines.push(format!("Reason: {}", decision.reason));
                if let Some(rule) = &decision.rule {
                    lines.push(format!("Rule: {}", rule));
                }
                for warning in &decision.warnings {
                    lines.push(format!("Warning: {}", warning));
                }
            }
            AuditEntry::UserConfirmed {
                action, confirmed, ..
            } => {
                lines.push(format!("Action: {}", sanitize_for_audit(action)));
                lines.push(format!(
                    "Response: {}",
                    if *confirmed { "✓ CONFIRMED" } else { "✗ REJECTED" }
                ));
            }
            AuditEntry::Executed {
                tool,
                parameters,
                outcome,
                ..
            } => {
                lines.push(format!("Tool: {}", tool));
                lines.push(format!("Parameters: {}", render_parameters(parameters)));
                lines.push(format!("Success: {}", outcome.success));
                if outcome.success {
                    lines.push(outcome_excerpt(outcome));
                } else {
                    lines.push(format!(
                        "Error: {}",
                        sanitize_for_audit(outcome.error.as_deref().unwrap_or("Unknown error"))
                    ));
                }
            }
            AuditEntry::ErrorOccurred {
                component, error, ..
            } => {
                lines.push(format!("Component: {}", component));
                lines.push(format!("Error: {}", sanitize_for_audit(error)));
            }
            AuditEntry::SessionEnded { .. } => {}
        }

        lines.push("-".repeat(HEAVY_RULE_WIDTH));
        format!("{}\n\n", lines.join("\n"))
    }
}

fn render_parameters(parameters: &Map<String, Value>) -> String {
    let text = serde_json::to_string(parameters).unwrap_or_else(|_| "{}".to_string());
    sanitize_for_audit(&text)
}

/// First `OUTPUT_EXCERPT_CHARS` of the most useful success field
fn outcome_excerpt(outcome: &ExecutionOutcome) -> String {
    let field = |key: &str| {
        outcome
            .payload
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
    };

    let (label, text) = if let Some(stdout) = field("stdout") {
        ("Output", stdout)
    } else if let Some(content) = field("content") {
        ("Content", content)
    } else {
        ("Result", outcome.display.as_str())
    };

    let excerpt: String = text.chars().take(OUTPUT_EXCERPT_CHARS).collect();
    let suffix = if text.chars().count() > OUTPUT_EXCERPT_CHARS {
        "..."
    } else {
        ""
    };
    format!("{}: {}{}", label, sanitize_for_audit(&excerpt), suffix)
}

// =============================================================================
// Sanitization
// =============================================================================

fn secret_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"(?i)(password|passwd|pwd)\s*[=:]\s*\S+",
                "[REDACTED_PASSWORD]",
            ),
            (
                r"(?i)(api[_-]?key|apikey)\s*[=:]\s*\S+",
                "[REDACTED_API_KEY]",
            ),
            (r"(?i)(secret|token)\s*[=:]\s*\S+", "[REDACTED_SECRET]"),
            (r"(?i)(bearer)\s+\S+", "Bearer [REDACTED]"),
            (r"(?i)Authorization:\s*\S+", "Authorization: [REDACTED]"),
        ]
        .iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, *replacement))
        })
        .collect()
    })
}

/// Sanitize text for audit logging (remove potential secrets)
pub fn sanitize_for_audit(text: &str) -> String {
    let mut sanitized = text.to_string();

    for (re, replacement) in secret_patterns() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }

    if sanitized.chars().count() > SANITIZE_MAX_CHARS {
        let head: String = sanitized.chars().take(SANITIZE_MAX_CHARS).collect();
        sanitized = format!("{}... [truncated]", head);
    }

    sanitized
}

// =============================================================================
// Log
// =============================================================================

/// Session audit log
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    session_id: String,
    started: DateTime<Local>,
    entries: Vec<AuditEntry>,
    ended: Arc<AtomicBool>,
}

impl AuditLog {
    /// Open (or create) the log file; the header is written on creation
    pub fn open(path: &Path) -> Result<Self> {
        let mut log = Self::in_memory();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            fs::write(path, log.header())?;
        }

        log.path = Some(path.to_path_buf());
        Ok(log)
    }

    /// Entries are kept for the session but nothing is written
    pub fn in_memory() -> Self {
        Self {
            path: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            started: Local::now(),
            entries: Vec::new(),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Result<Self> {
        if config.enabled {
            Self::open(&config.log_file)
        } else {
            Ok(Self::in_memory())
        }
    }

    fn header(&self) -> String {
        let heavy = "=".repeat(HEAVY_RULE_WIDTH);
        format!(
            "{heavy}\nAI Agent Operation Log\nStarted: {}\nSession: {}\n{heavy}\n\n",
            self.started.format(TIMESTAMP_FORMAT),
            self.session_id,
            heavy = heavy
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Append an entry
    pub fn record(&mut self, entry: AuditEntry) {
        if let Some(path) = &self.path {
            if let Err(e) = append(path, &entry.render()) {
                warn!("Audit log write to {} failed: {}", path.display(), e);
            }
        }
        self.entries.push(entry);
    }

    pub fn log_intent(&mut self, user_input: &str, intent: &Intent) {
        self.record(AuditEntry::intent(user_input, intent));
    }

    pub fn log_safety_check(&mut self, check: CheckKind, target: &str, decision: &SafetyDecision) {
        self.record(AuditEntry::safety(check, target, decision));
    }

    pub fn log_confirmation(&mut self, action: &str, confirmed: bool) {
        self.record(AuditEntry::confirmation(action, confirmed));
    }

    pub fn log_execution(
        &mut self,
        tool: &str,
        parameters: Map<String, Value>,
        outcome: &ExecutionOutcome,
    ) {
        self.record(AuditEntry::execution(tool, parameters, outcome));
    }

    pub fn log_error(&mut self, component: &str, error: &str) {
        self.record(AuditEntry::error(component, error));
    }

    /// Write the session end once; later calls are no-ops
    pub fn end_session(&mut self) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.record(AuditEntry::session_end());
        true
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Handle that can end this session from another thread
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            path: self.path.clone(),
            ended: Arc::clone(&self.ended),
        }
    }
}

/// Ends a session from outside the turn loop, e.g. on Ctrl-C.
///
/// Shares the end-of-session flag with its log, so the session-end entry is
/// written once whichever side gets there first.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    path: Option<PathBuf>,
    ended: Arc<AtomicBool>,
}

impl SessionCloser {
    /// Write the session end unless it was already written
    pub fn close(&self) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(path) = &self.path {
            if let Err(e) = append(path, &AuditEntry::session_end().render()) {
                warn!("Audit log write to {} failed: {}", path.display(), e);
            }
        }
        true
    }
}

fn append(path: &Path, text: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}

/// Last `max_lines` lines of a log file
pub fn tail_file(path: &Path, max_lines: usize) -> io::Result<String> {
    let contents = fs::read_to_string(path)?;
    let lines: Vec<&str> = contents.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].join("\n"))
}
