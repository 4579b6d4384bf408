//! Built-in tool handlers
//!
//! Real implementations for the canonical intents, wired to the command
//! executor and file operator. Each handler returns a `ToolOutput` whose
//! display text is what the user sees; operation failures are reported in
//! the output, missing parameters as `ToolError`.

use crate::config::WardenConfig;
use crate::error::Result;
use crate::executor::{CommandExecutor, CommandResult};
use crate::files::{DirectoryListing, EntryKind, FileContent, FileOperator};
use crate::intent::{CodeParams, CommandParams, PathParams, WriteParams, DEFAULT_LIST_PATH};
use crate::router::{Handler, ToolError, ToolOutput, ToolResult, ToolRouter};
use crate::safety::{OperationKind, SafetyPolicy};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Capabilities reply for `chat`
pub const CHAT_RESPONSE: &str = concat!(
    "I'm here to help! I can execute commands, read/write files, ",
    "list directories, and run Python code. What would you like to do?"
);

/// Characters of file content shown for `read_file`
pub const READ_DISPLAY_CHARS: usize = 1000;

/// Entries shown for `list_directory`
pub const LIST_DISPLAY_ENTRIES: usize = 20;

/// Everything the built-in handlers need
#[derive(Clone)]
pub struct ToolContext {
    pub executor: Arc<CommandExecutor>,
    pub files: FileOperator,
    pub working_dir: PathBuf,
    pub command_timeout: Duration,
    pub python_timeout: Duration,
}

impl ToolContext {
    /// Executor and file operator rooted at the policy's project root
    pub fn from_config(config: &WardenConfig, policy: &SafetyPolicy) -> Result<Self> {
        let root = policy.project_root().to_path_buf();
        let executor = CommandExecutor::new(
            &root,
            &config.execution.python,
            policy.max_output_length(),
        )?;

        Ok(Self {
            executor: Arc::new(executor),
            files: FileOperator::new(
                policy.clone(),
                config.files.max_file_size,
                config.files.show_hidden,
            ),
            working_dir: root,
            command_timeout: policy.timeout_for(OperationKind::Command),
            python_timeout: policy.timeout_for(OperationKind::Python),
        })
    }
}

/// Placeholder router with every built-in handler upserted
pub fn builtin_router(ctx: &ToolContext) -> ToolRouter {
    let mut router = ToolRouter::new();
    for handler in builtin_handlers(ctx) {
        router.register(handler);
    }
    router
}

/// All built-in handlers, ready to register
pub fn builtin_handlers(ctx: &ToolContext) -> Vec<Handler> {
    vec![
        command_handler(ctx),
        read_handler(ctx),
        write_handler(ctx),
        list_handler(ctx),
        python_handler(ctx),
        chat_handler(),
    ]
}

pub fn command_handler(ctx: &ToolContext) -> Handler {
    let executor = ctx.executor.clone();
    let cwd = ctx.working_dir.clone();
    let timeout = ctx.command_timeout;

    Handler::ExecuteCommand(Box::new(move |params: &CommandParams| -> ToolResult {
        let command = params
            .command
            .as_deref()
            .ok_or(ToolError::MissingParameter("command"))?;
        let result = executor.run(command, &cwd, timeout);
        Ok(process_output("Command", &result))
    }))
}

pub fn python_handler(ctx: &ToolContext) -> Handler {
    let executor = ctx.executor.clone();
    let timeout = ctx.python_timeout;

    Handler::RunPython(Box::new(move |params: &CodeParams| -> ToolResult {
        let code = params
            .code
            .as_deref()
            .ok_or(ToolError::MissingParameter("code"))?;
        let result = executor.run_python(code, timeout);
        Ok(process_output("Python", &result))
    }))
}

pub fn read_handler(ctx: &ToolContext) -> Handler {
    let files = ctx.files.clone();

    Handler::ReadFile(Box::new(move |params: &PathParams| -> ToolResult {
        let path = params
            .path
            .as_deref()
            .ok_or(ToolError::MissingParameter("path"))?;
        Ok(match files.read(path) {
            Ok(content) => ToolOutput::ok(format_read(&content), to_payload(&content)),
            Err(e) => ToolOutput::failed(format!("Read failed: {}", e), Value::Null),
        })
    }))
}

pub fn write_handler(ctx: &ToolContext) -> Handler {
    let files = ctx.files.clone();

    Handler::WriteFile(Box::new(move |params: &WriteParams| -> ToolResult {
        let path = params
            .path
            .as_deref()
            .ok_or(ToolError::MissingParameter("path"))?;
        let content = params
            .content
            .as_deref()
            .ok_or(ToolError::MissingParameter("content"))?;
        Ok(match files.write(path, content) {
            Ok(report) => ToolOutput::ok(
                format!(
                    "✓ File written successfully: {} ({} bytes)",
                    path, report.size
                ),
                to_payload(&report),
            ),
            Err(e) => ToolOutput::failed(format!("Write failed: {}", e), Value::Null),
        })
    }))
}

pub fn list_handler(ctx: &ToolContext) -> Handler {
    let files = ctx.files.clone();

    Handler::ListDirectory(Box::new(move |params: &PathParams| -> ToolResult {
        let path = params.path.as_deref().unwrap_or(DEFAULT_LIST_PATH);
        Ok(match files.list(path) {
            Ok(listing) => ToolOutput::ok(format_listing(path, &listing), to_payload(&listing)),
            Err(e) => ToolOutput::failed(format!("List failed: {}", e), Value::Null),
        })
    }))
}

pub fn chat_handler() -> Handler {
    Handler::Chat(Box::new(|| -> ToolResult {
        Ok(ToolOutput::ok(
            CHAT_RESPONSE,
            serde_json::json!({ "message": CHAT_RESPONSE }),
        ))
    }))
}

/// Display and payload for a finished child process
fn process_output(label: &str, result: &CommandResult) -> ToolOutput {
    let payload = to_payload(result);
    if result.success {
        ToolOutput::ok(
            format!(
                "✓ {} executed successfully:\n{}",
                label,
                result.stdout.trim()
            ),
            payload,
        )
    } else {
        ToolOutput::failed(
            format!("{} failed: {}", label, result.failure_message()),
            payload,
        )
    }
}

/// File content, cut to the first `READ_DISPLAY_CHARS` characters
pub fn format_read(content: &FileContent) -> String {
    let shown = if content.content.chars().count() > READ_DISPLAY_CHARS {
        let head: String = content.content.chars().take(READ_DISPLAY_CHARS).collect();
        format!(
            "{}\n... (showing first {} chars of {} bytes)",
            head, READ_DISPLAY_CHARS, content.size
        )
    } else {
        content.content.clone()
    };
    format!("✓ File content ({} bytes):\n{}", content.size, shown)
}

/// Directory listing, first `LIST_DISPLAY_ENTRIES` entries
pub fn format_listing(path: &str, listing: &DirectoryListing) -> String {
    let mut lines = vec![format!("✓ Directory: {} ({} items)", path, listing.count)];

    for entry in listing.entries.iter().take(LIST_DISPLAY_ENTRIES) {
        match (entry.kind, entry.size) {
            (EntryKind::File, Some(size)) => {
                lines.push(format!("  📄 {} ({} bytes)", entry.name, size))
            }
            (EntryKind::File, None) => lines.push(format!("  📄 {}", entry.name)),
            (EntryKind::Directory, _) => lines.push(format!("  📁 {}", entry.name)),
        }
    }

    if listing.count > LIST_DISPLAY_ENTRIES {
        lines.push(format!(
            "  ... and {} more items",
            listing.count - LIST_DISPLAY_ENTRIES
        ));
    }

    lines.join("\n")
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
