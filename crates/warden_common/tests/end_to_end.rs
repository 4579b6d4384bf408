//! End-to-end turns through the orchestrator
//!
//! Scratch project root and audit log live in a tempdir; the completion
//! service and the user are scripted.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use warden_common::audit::AuditEntry;
use warden_common::intent::{Action, CommandParams, PathParams};
use warden_common::llm::LlmError;
use warden_common::orchestrator::{ScriptedConfirmer, TurnState};
use warden_common::{FakeCompletionService, Orchestrator, WardenConfig};

fn config_for(root: &Path) -> WardenConfig {
    let mut config = WardenConfig::default();
    config.security.project_root = root.to_path_buf();
    config.logging.log_file = root.join("logs/agent_log.txt");
    config
}

fn session(
    service: FakeCompletionService,
    confirmer: ScriptedConfirmer,
) -> (TempDir, Orchestrator) {
    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::from_config(
        &config_for(dir.path()),
        Box::new(service),
        Box::new(confirmer),
    )
    .unwrap();
    (dir, orch)
}

fn log_text(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("logs/agent_log.txt")).unwrap()
}

#[test]
fn test_run_dir_with_unparsable_model_output() {
    let confirmer = ScriptedConfirmer::new(vec![false]);
    let prompts = confirmer.prompts();
    let (dir, mut orch) = session(FakeCompletionService::always("Sure thing!"), confirmer);

    let response = orch.process_turn("run dir");

    let intent = orch.last_intent().unwrap();
    assert_eq!(
        intent.action,
        Action::ExecuteCommand(CommandParams {
            command: Some("dir".to_string())
        })
    );
    assert_eq!(intent.confidence, 0.6);

    // Confirmation is required by default; declined here
    assert_eq!(prompts.lock().unwrap().as_slice(), ["Execute command: dir"]);
    assert_eq!(response, "❌ Operation cancelled by user");

    let log = log_text(&dir);
    assert!(log.contains("Recognized Intent: execute_command"));
    assert!(log.contains("Type: command\nTarget: dir\nStatus: ✓ SAFE"));
    assert!(log.contains("Action: Execute command: dir\nResponse: ✗ REJECTED"));
}

#[test]
fn test_read_readme_with_failed_backend() {
    let (dir, mut orch) = session(
        FakeCompletionService::always_error(LlmError::HttpError("connection refused".into())),
        ScriptedConfirmer::always(false),
    );
    fs::write(dir.path().join("README.md"), "# Project\n").unwrap();

    let response = orch.process_turn("read README.md");

    let intent = orch.last_intent().unwrap();
    assert_eq!(
        intent.action,
        Action::ReadFile(PathParams {
            path: Some("README.md".to_string())
        })
    );
    assert_eq!(intent.confidence, 0.6);
    assert_eq!(response, "✓ File content (10 bytes):\n# Project\n");
}

#[test]
fn test_chat_parameters_are_dropped() {
    let (dir, mut orch) = session(
        FakeCompletionService::always(
            r#"{"intent": "chat", "parameters": {"foo": "bar"}, "confidence": 0.9}"#,
        ),
        ScriptedConfirmer::always(false),
    );

    orch.process_turn("hi there");

    let intent = orch.last_intent().unwrap();
    assert_eq!(intent.action, Action::Chat);
    assert!(intent.parameters().is_empty());
    assert_eq!(intent.confidence, 0.9);
    assert!(log_text(&dir).contains("Parameters: {}\nConfidence: 0.90"));
}

#[test]
fn test_forbidden_command_is_blocked_before_confirmation() {
    let confirmer = ScriptedConfirmer::always(true);
    let prompts = confirmer.prompts();
    let (dir, mut orch) = session(
        FakeCompletionService::always(
            r#"{"intent":"execute_command","parameters":{"command":"format C:"},"confidence":0.95}"#,
        ),
        confirmer,
    );

    let response = orch.process_turn("format the C drive");

    assert!(response.starts_with("❌ Command blocked:"));
    assert!(response.contains("format"));
    assert!(prompts.lock().unwrap().is_empty());

    let log = log_text(&dir);
    assert!(
        log.contains("Status: ✗ UNSAFE\nReason: Command contains forbidden operation: format")
    );
    assert!(!log.contains("] EXECUTION"));
}

#[test]
fn test_low_confidence_is_rejected_without_executing() {
    let confirmer = ScriptedConfirmer::always(true);
    let prompts = confirmer.prompts();
    let (dir, mut orch) = session(
        FakeCompletionService::always(
            r#"{"intent":"write_file","parameters":{"path":"x.txt","content":"y"},"confidence":0.2}"#,
        ),
        confirmer,
    );

    let response = orch.process_turn("maybe write something");

    assert_eq!(response, "❌ Error: Low confidence (0.20) for intent: write_file");
    assert!(prompts.lock().unwrap().is_empty());
    assert!(!dir.path().join("x.txt").exists());
    assert!(!orch
        .audit()
        .entries()
        .iter()
        .any(|e| matches!(e, AuditEntry::Executed { .. } | AuditEntry::SafetyChecked { .. })));
}

#[test]
fn test_path_escape_is_blocked() {
    let (_dir, mut orch) = session(
        FakeCompletionService::always(
            r#"{"intent":"read_file","parameters":{"path":"../../etc/passwd"},"confidence":0.9}"#,
        ),
        ScriptedConfirmer::always(true),
    );

    let response = orch.process_turn("show me the passwords");
    assert!(response.starts_with("❌ Path blocked: Path is outside project root: "));
}

#[test]
fn test_list_directory_defaults_to_project_root() {
    let (dir, mut orch) = session(
        FakeCompletionService::always(
            r#"{"intent":"list_directory","parameters":{},"confidence":0.8}"#,
        ),
        ScriptedConfirmer::always(false),
    );
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();

    let response = orch.process_turn("what's in here");
    assert!(response.starts_with("✓ Directory: . ("));
    assert!(response.contains("  📁 src"));
    assert!(response.contains("  📄 Cargo.toml (9 bytes)"));
}

#[cfg(unix)]
#[test]
fn test_confirmed_command_runs_in_project_root() {
    let (dir, mut orch) = session(
        FakeCompletionService::always(
            r#"{"intent":"execute_command","parameters":{"command":"ls"},"confidence":0.9}"#,
        ),
        ScriptedConfirmer::new(vec![true]),
    );
    fs::write(dir.path().join("marker.txt"), "").unwrap();

    let response = orch.process_turn("run ls");
    assert!(response.starts_with("✓ Command executed successfully:\n"));
    assert!(response.contains("marker.txt"));

    let log = log_text(&dir);
    assert!(log.contains(
        "Tool: execute_command\nParameters: {\"command\":\"ls\"}\nSuccess: true\nOutput: "
    ));
}

#[test]
fn test_every_turn_ends_idle_and_session_end_is_written() {
    let (dir, mut orch) = session(
        FakeCompletionService::new(vec![
            Ok("nonsense".to_string()),
            Ok(r#"{"intent":"teleport","parameters":{},"confidence":0.99}"#.to_string()),
        ]),
        ScriptedConfirmer::always(false),
    );

    assert!(orch.process_turn("hello").starts_with("I'm here to help!"));
    assert_eq!(orch.state(), TurnState::Idle);

    assert_eq!(orch.process_turn("teleport me"), "❌ Error: Unknown tool: teleport");
    assert_eq!(orch.state(), TurnState::Idle);

    orch.end_session();
    let log = log_text(&dir);
    assert_eq!(log.matches("AI Agent Operation Log").count(), 1);
    assert!(log.trim_end().ends_with(&"=".repeat(80)));
    assert!(log.contains("Session Ended: "));
}
