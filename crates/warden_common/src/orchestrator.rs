//! Orchestrator
//!
//! Runs one turn at a time:
//!
//! ```text
//! Idle → Classifying → SafetyChecking → AwaitingConfirmation → Executing → Logged → Idle
//! ```
//!
//! Every turn produces exactly one response string and ends in `Idle`.
//! Errors and panics inside a turn are caught here, recorded in the audit
//! log and returned as `❌ Agent error: ...`; the session continues.

use crate::audit::{AuditLog, CheckKind};
use crate::classifier::{panic_message, IntentClassifier};
use crate::config::WardenConfig;
use crate::error::Result;
use crate::intent::{Action, Intent, DEFAULT_LIST_PATH};
use crate::llm::{CompletionService, GenerationOptions};
use crate::router::ToolRouter;
use crate::safety::{SafetyDecision, SafetyPolicy};
use crate::tools::{builtin_router, ToolContext};
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Words that end an interactive session
pub const EXIT_COMMANDS: &[&str] = &["quit", "exit", "bye", "q"];

/// Characters of Python code shown in the confirmation prompt
const PYTHON_PROMPT_CHARS: usize = 50;

pub fn is_exit_command(input: &str) -> bool {
    let lowered = input.trim().to_lowercase();
    EXIT_COMMANDS.contains(&lowered.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Classifying,
    SafetyChecking,
    AwaitingConfirmation,
    Executing,
    Logged,
}

// =============================================================================
// Confirmation
// =============================================================================

/// Asks the user to approve a side-effecting action
pub trait Confirmer {
    fn confirm(&self, action: &str) -> io::Result<bool>;
}

/// Approves everything (`--yes`)
pub struct AutoConfirmer;

impl Confirmer for AutoConfirmer {
    fn confirm(&self, _action: &str) -> io::Result<bool> {
        Ok(true)
    }
}

/// Confirmer with pre-recorded answers
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConfirmer {
    /// Answers in order, then `false`
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            fallback: false,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            fallback: answer,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of the prompts shown so far
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, action: &str) -> io::Result<bool> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(action.to_string());
        }
        let next = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front());
        Ok(next.unwrap_or(self.fallback))
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    classifier: IntentClassifier,
    policy: SafetyPolicy,
    router: ToolRouter,
    audit: AuditLog,
    confirmer: Box<dyn Confirmer>,
    state: TurnState,
    last_intent: Option<Intent>,
}

impl Orchestrator {
    pub fn new(
        classifier: IntentClassifier,
        policy: SafetyPolicy,
        router: ToolRouter,
        audit: AuditLog,
        confirmer: Box<dyn Confirmer>,
    ) -> Self {
        Self {
            classifier,
            policy,
            router,
            audit,
            confirmer,
            state: TurnState::Idle,
            last_intent: None,
        }
    }

    /// Wire every component from configuration.
    ///
    /// Fails on an unusable project root, an unwritable audit log or a
    /// process runtime that cannot start.
    pub fn from_config(
        config: &WardenConfig,
        service: Box<dyn CompletionService>,
        confirmer: Box<dyn Confirmer>,
    ) -> Result<Self> {
        let policy = SafetyPolicy::from_config(&config.security)?;
        let ctx = ToolContext::from_config(config, &policy)?;
        let router = builtin_router(&ctx);

        let classifier = IntentClassifier::new(service)
            .with_options(GenerationOptions::from(&config.model));
        let audit = AuditLog::from_config(&config.logging)?;

        tracing::info!(
            "Orchestrator ready (root: {}, session: {})",
            policy.project_root().display(),
            audit.session_id()
        );

        Ok(Self::new(classifier, policy, router, audit, confirmer))
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// For registering custom tools
    pub fn router_mut(&mut self) -> &mut ToolRouter {
        &mut self.router
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Intent recognized in the most recent turn
    pub fn last_intent(&self) -> Option<&Intent> {
        self.last_intent.as_ref()
    }

    /// Handle one user request and return the response
    pub fn process_turn(&mut self, user_input: &str) -> String {
        self.last_intent = None;

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_turn(user_input)));
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => self.agent_error(&e.to_string()),
            Err(payload) => self.agent_error(&panic_message(payload.as_ref())),
        };

        self.transition(TurnState::Idle);
        response
    }

    /// Record the end of the session (once)
    pub fn end_session(&mut self) {
        if self.audit.end_session() {
            debug!("Session {} ended", self.audit.session_id());
        }
    }

    fn agent_error(&mut self, error: &str) -> String {
        let message = format!("Agent error: {}", error);
        self.audit.log_error("orchestrator", &message);
        format!("❌ {}", message)
    }

    fn transition(&mut self, next: TurnState) {
        debug!("Turn state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run_turn(&mut self, user_input: &str) -> Result<String> {
        self.transition(TurnState::Classifying);
        let intent = self.classifier.classify(user_input);
        self.audit.log_intent(user_input, &intent);
        self.last_intent = Some(intent.clone());

        let route = self.router.route(&intent);
        if !route.accepted {
            debug!("Route rejected: {}", route.message);
            self.audit.log_error("router", &route.message);
            self.transition(TurnState::Logged);
            return Ok(format!("❌ Error: {}", route.message));
        }

        self.transition(TurnState::SafetyChecking);
        if let Some(blocked) = self.safety_check(&intent) {
            self.transition(TurnState::Logged);
            return Ok(blocked);
        }

        if let Some(prompt) = confirmation_prompt(&intent) {
            if self.policy.requires_confirmation() {
                self.transition(TurnState::AwaitingConfirmation);
                let confirmed = self.confirmer.confirm(&prompt)?;
                self.audit.log_confirmation(&prompt, confirmed);
                if !confirmed {
                    self.transition(TurnState::Logged);
                    return Ok("❌ Operation cancelled by user".to_string());
                }
            }
        }

        self.transition(TurnState::Executing);
        let outcome = self.router.execute(&intent);
        self.audit
            .log_execution(intent.name(), intent.parameters(), &outcome);

        self.transition(TurnState::Logged);
        Ok(outcome.display)
    }

    /// Returns the response when the intent is blocked
    fn safety_check(&mut self, intent: &Intent) -> Option<String> {
        let (kind, target) = match &intent.action {
            Action::ExecuteCommand(p) => (CheckKind::Command, p.command.clone()?),
            Action::ReadFile(p) => (CheckKind::Path, p.path.clone()?),
            Action::WriteFile(p) => (CheckKind::Path, p.path.clone()?),
            Action::ListDirectory(p) => (
                CheckKind::Path,
                p.path.clone().unwrap_or_else(|| DEFAULT_LIST_PATH.to_string()),
            ),
            Action::RunPython(_) | Action::Chat | Action::Error(_) | Action::Custom { .. } => {
                return None
            }
        };

        let decision: SafetyDecision = match kind {
            CheckKind::Command => self.policy.check_command(&target),
            CheckKind::Path => self.policy.check_path(&target),
        };
        for warning in &decision.warnings {
            debug!("Safety observation for '{}': {}", target, warning);
        }
        self.audit.log_safety_check(kind, &target, &decision);

        if decision.is_allowed {
            return None;
        }
        Some(match kind {
            CheckKind::Command => format!("❌ Command blocked: {}", decision.reason),
            CheckKind::Path => format!("❌ Path blocked: {}", decision.reason),
        })
    }
}

/// Confirmation text for side-effecting intents with their parameter present
fn confirmation_prompt(intent: &Intent) -> Option<String> {
    match &intent.action {
        Action::ExecuteCommand(p) => p
            .command
            .as_ref()
            .map(|command| format!("Execute command: {}", command)),
        Action::WriteFile(p) => p.path.as_ref().map(|path| format!("Write to file: {}", path)),
        Action::RunPython(p) => p.code.as_ref().map(|code| {
            let head: String = code.chars().take(PYTHON_PROMPT_CHARS).collect();
            format!("Execute Python code: {}...", head)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEntry;
    use crate::intent::{CodeParams, CommandParams, WriteParams};
    use crate::llm::FakeCompletionService;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> WardenConfig {
        let mut config = WardenConfig::default();
        config.security.project_root = dir.to_path_buf();
        config.logging.log_file = dir.join("logs/audit.txt");
        config
    }

    fn orchestrator(model_output: &str, confirmer: ScriptedConfirmer) -> (TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::from_config(
            &config_for(dir.path()),
            Box::new(FakeCompletionService::always(model_output)),
            Box::new(confirmer),
        )
        .unwrap();
        (dir, orch)
    }

    struct FailingConfirmer;

    impl Confirmer for FailingConfirmer {
        fn confirm(&self, _action: &str) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"))
        }
    }

    #[test]
    fn test_exit_commands() {
        for word in ["quit", "EXIT", " bye ", "Q"] {
            assert!(is_exit_command(word));
        }
        assert!(!is_exit_command("quitter"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn test_confirmation_prompts() {
        let cmd = Intent::new(
            Action::ExecuteCommand(CommandParams {
                command: Some("dir".into()),
            }),
            0.9,
        );
        assert_eq!(confirmation_prompt(&cmd).as_deref(), Some("Execute command: dir"));

        let write = Intent::new(
            Action::WriteFile(WriteParams {
                path: Some("a.txt".into()),
                content: None,
            }),
            0.9,
        );
        assert_eq!(confirmation_prompt(&write).as_deref(), Some("Write to file: a.txt"));

        let code = "x".repeat(80);
        let py = Intent::new(Action::RunPython(CodeParams { code: Some(code) }), 0.9);
        assert_eq!(
            confirmation_prompt(&py),
            Some(format!("Execute Python code: {}...", "x".repeat(50)))
        );

        assert!(confirmation_prompt(&Intent::chat(0.9)).is_none());
    }

    #[test]
    fn test_chat_turn() {
        let (_dir, mut orch) = orchestrator(
            r#"{"intent":"chat","parameters":{"foo":"bar"},"confidence":0.9}"#,
            ScriptedConfirmer::always(false),
        );
        let response = orch.process_turn("hello");

        assert!(response.starts_with("I'm here to help!"));
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.last_intent().unwrap().parameters().is_empty());
    }

    #[test]
    fn test_blocked_command_skips_confirmation() {
        let confirmer = ScriptedConfirmer::always(true);
        let prompts = confirmer.prompts();
        let (_dir, mut orch) = orchestrator(
            r#"{"intent":"execute_command","parameters":{"command":"format C:"},"confidence":0.9}"#,
            confirmer,
        );

        let response = orch.process_turn("format my drive");
        assert_eq!(
            response,
            "❌ Command blocked: Command contains forbidden operation: format"
        );
        assert!(prompts.lock().unwrap().is_empty());
        assert!(!orch
            .audit()
            .entries()
            .iter()
            .any(|e| matches!(e, AuditEntry::Executed { .. })));
    }

    #[test]
    fn test_cancelled_by_user() {
        let confirmer = ScriptedConfirmer::new(vec![false]);
        let prompts = confirmer.prompts();
        let (dir, mut orch) = orchestrator(
            r#"{"intent":"write_file","parameters":{"path":"a.txt","content":"x"},"confidence":0.9}"#,
            confirmer,
        );

        let response = orch.process_turn("write x to a.txt");
        assert_eq!(response, "❌ Operation cancelled by user");
        assert_eq!(prompts.lock().unwrap().as_slice(), ["Write to file: a.txt"]);
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_confirmed_write() {
        let (dir, mut orch) = orchestrator(
            r#"{"intent":"write_file","parameters":{"path":"a.txt","content":"x"},"confidence":0.9}"#,
            ScriptedConfirmer::new(vec![true]),
        );

        let response = orch.process_turn("write x to a.txt");
        assert_eq!(response, "✓ File written successfully: a.txt (1 bytes)");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "x");
    }

    #[test]
    fn test_confirmer_error_becomes_agent_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = Orchestrator::from_config(
            &config_for(dir.path()),
            Box::new(FakeCompletionService::always(
                r#"{"intent":"run_python","parameters":{"code":"print(1)"},"confidence":0.9}"#,
            )),
            Box::new(FailingConfirmer),
        )
        .unwrap();

        let response = orch.process_turn("calculate 1");
        assert_eq!(response, "❌ Agent error: IO error: stdin closed");
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.audit().entries().iter().any(|e| matches!(
            e,
            AuditEntry::ErrorOccurred { component, .. } if component == "orchestrator"
        )));

        // Session continues
        assert_eq!(orch.process_turn("again"), "❌ Agent error: IO error: stdin closed");
    }

    #[test]
    fn test_unknown_tool_short_circuits() {
        let confirmer = ScriptedConfirmer::always(true);
        let prompts = confirmer.prompts();
        let (_dir, mut orch) = orchestrator(
            r#"{"intent":"send_email","parameters":{"to":"x"},"confidence":0.95}"#,
            confirmer,
        );

        assert_eq!(orch.process_turn("email x"), "❌ Error: Unknown tool: send_email");
        assert!(prompts.lock().unwrap().is_empty());
        assert!(!orch
            .audit()
            .entries()
            .iter()
            .any(|e| matches!(e, AuditEntry::SafetyChecked { .. })));
    }

    #[test]
    fn test_no_confirmation_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.security.require_confirmation = false;
        let confirmer = ScriptedConfirmer::always(false);
        let prompts = confirmer.prompts();

        let mut orch = Orchestrator::from_config(
            &config,
            Box::new(FakeCompletionService::always(
                r#"{"intent":"write_file","parameters":{"path":"b.txt","content":"hi"},"confidence":0.9}"#,
            )),
            Box::new(confirmer),
        )
        .unwrap();

        assert!(orch.process_turn("write hi").starts_with("✓ File written"));
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_end_session_once() {
        let (dir, mut orch) = orchestrator("", ScriptedConfirmer::always(false));
        orch.end_session();
        orch.end_session();

        let log = std::fs::read_to_string(dir.path().join("logs/audit.txt")).unwrap();
        assert_eq!(log.matches("Session Ended:").count(), 1);
    }
}
