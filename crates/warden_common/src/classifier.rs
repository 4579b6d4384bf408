//! Intent Classifier
//!
//! Turns free text into an `Intent`. The completion service is asked for a
//! JSON object; when it gives none (or something unusable), a deterministic
//! keyword/regex recognizer takes over.
//!
//! ## Flow
//!
//! ```text
//! user text → prompt → completion service → first JSON object?
//!                                              │ yes → typed parameter parse
//!                                              │ no  → fallback(model output)
//!                                              │        └─ nothing → fallback(user text)
//! ```
//!
//! `classify` never fails. A panic inside the completion service yields an
//! `error` intent with confidence 0.0.

use crate::intent::{Action, CommandParams, Intent, PathParams, DEFAULT_LIST_PATH};
use crate::llm::{CompletionService, GenerationOptions};
use regex::Regex;
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Confidence of any fallback match
pub const FALLBACK_MATCH_CONFIDENCE: f64 = 0.6;

/// Confidence of the fallback chat default
pub const FALLBACK_CHAT_CONFIDENCE: f64 = 0.3;

/// Confidence assumed when the model omits one
pub const DEFAULT_JSON_CONFIDENCE: f64 = 0.5;

/// Instruction prompt for intent recognition
pub const SYSTEM_PROMPT: &str = r#"Analyze the user command and return JSON with intent and parameters.

Tools:
- execute_command: Run shell command. Params: {"command": "cmd"}
  Examples: "run dir", "execute test.sh", "run ls -la src"
- read_file: Read file. Params: {"path": "filepath"}
  Examples: "read README.md", "show config.toml"
- write_file: Write file. Params: {"path": "filepath", "content": "text"}
  Examples: "create test.txt", "write to file.log"
- list_directory: List dir. Params: {"path": "dirpath"}
  Examples: "list examples", "show directory"
- run_python: Run Python. Params: {"code": "python code"}
  Examples: "calculate 2+2", "run python: print('hi')"
- chat: General talk. Params: {} (NO OTHER PARAMS)
  Examples: "hello", "help", "what can you do"

IMPORTANT:
- For "chat" intent, parameters MUST be empty: {}
- For "execute_command", extract ONLY the command path/text
- Match the exact parameter names shown above

JSON format: {"intent":"tool","parameters":{...},"confidence":0.9}"#;

const COMMAND_KEYWORDS: &[&str] = &["run", "execute", "command", "dir", "ls"];
const READ_KEYWORDS: &[&str] = &["read", "show", "cat", "display"];
const LIST_KEYWORDS: &[&str] = &["list", "ls", "directory"];

struct FallbackPatterns {
    command: Vec<Regex>,
    read: Regex,
    list: Regex,
}

fn patterns() -> &'static FallbackPatterns {
    static PATTERNS: OnceLock<FallbackPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FallbackPatterns {
        command: vec![
            Regex::new(r#"(?i)command["']:\s*["']([^"']+)["']"#).expect("valid regex"),
            Regex::new(r"(?i)run\s+(.+)").expect("valid regex"),
            Regex::new(r"(?i)execute\s+(.+)").expect("valid regex"),
        ],
        read: Regex::new(r"(?i)(?:read|show|cat|display)\s+(.+)").expect("valid regex"),
        list: Regex::new(r"(?i)(?:list|ls|directory)\s+(.+)").expect("valid regex"),
    })
}

/// Build the full prompt for one user command
pub fn build_prompt(user_input: &str) -> String {
    format!(
        "{}\n\nUser command: {}\n\nJSON response:",
        SYSTEM_PROMPT, user_input
    )
}

/// Extract the first JSON object in `text`.
///
/// Parsing starts at the first `{` and stops at the end of the first complete
/// value, so commentary before or after the object is ignored.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(map))) => Some(map),
        _ => None,
    }
}

/// Turn a decoded JSON object into an intent.
///
/// Returns `None` when the object has no string `intent` field.
pub fn intent_from_json(obj: &Map<String, Value>) -> Option<Intent> {
    let name = obj.get("intent")?.as_str()?;

    let empty = Map::new();
    let parameters = obj
        .get("parameters")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);

    let confidence = match obj.get("confidence").and_then(|c| c.as_f64()) {
        Some(c) if (0.0..=1.0).contains(&c) => c,
        Some(c) => {
            warn!("Classifier confidence {} outside [0, 1], clamping", c);
            c.clamp(0.0, 1.0)
        }
        None => DEFAULT_JSON_CONFIDENCE,
    };

    Some(Intent::from_parts(name, parameters, confidence))
}

/// Deterministic pattern recognizer.
///
/// Priority: command execution, file read, directory listing, chat.
pub fn fallback_recognition(text: &str) -> Intent {
    let lower = text.to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
    let patterns = patterns();

    if has_any(COMMAND_KEYWORDS) {
        for pattern in &patterns.command {
            if let Some(command) = capture(pattern, text) {
                return Intent::new(
                    Action::ExecuteCommand(CommandParams {
                        command: Some(command),
                    }),
                    FALLBACK_MATCH_CONFIDENCE,
                );
            }
        }
    }

    if has_any(READ_KEYWORDS) {
        if let Some(path) = capture(&patterns.read, text) {
            return Intent::new(
                Action::ReadFile(PathParams { path: Some(path) }),
                FALLBACK_MATCH_CONFIDENCE,
            );
        }
    }

    if has_any(LIST_KEYWORDS) {
        let path = capture(&patterns.list, text).unwrap_or_else(|| DEFAULT_LIST_PATH.to_string());
        return Intent::new(
            Action::ListDirectory(PathParams { path: Some(path) }),
            FALLBACK_MATCH_CONFIDENCE,
        );
    }

    Intent::chat(FALLBACK_CHAT_CONFIDENCE)
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Classification result with the raw model output kept for diagnostics
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub raw_response: Option<String>,
    pub used_fallback: bool,
}

/// Completion-backed intent classifier
pub struct IntentClassifier {
    service: Box<dyn CompletionService>,
    options: GenerationOptions,
}

impl IntentClassifier {
    pub fn new(service: Box<dyn CompletionService>) -> Self {
        Self {
            service,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Classify user text into an intent
    pub fn classify(&self, user_input: &str) -> Intent {
        self.classify_detailed(user_input).intent
    }

    /// Classify and keep the raw model output
    pub fn classify_detailed(&self, user_input: &str) -> Classification {
        let prompt = build_prompt(user_input);

        let generated = panic::catch_unwind(AssertUnwindSafe(|| {
            self.service.generate(&prompt, &self.options)
        }));

        let raw = match generated {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(e)) => {
                warn!("Completion service failed, using pattern fallback: {}", e);
                return Classification {
                    intent: fallback_recognition(user_input),
                    raw_response: None,
                    used_fallback: true,
                };
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!("Completion service panicked: {}", reason);
                return Classification {
                    intent: Intent::error(format!("Intent recognition failed: {}", reason)),
                    raw_response: None,
                    used_fallback: false,
                };
            }
        };

        if let Some(intent) = extract_json_object(&raw).as_ref().and_then(intent_from_json) {
            debug!("Model classified '{}' as {}", user_input, intent.name());
            return Classification {
                intent,
                raw_response: Some(raw),
                used_fallback: false,
            };
        }

        debug!("No usable JSON in model output, using pattern fallback");
        let mut intent = fallback_recognition(&raw);
        if matches!(intent.action, Action::Chat) {
            intent = fallback_recognition(user_input);
        }

        Classification {
            intent,
            raw_response: Some(raw),
            used_fallback: true,
        }
    }
}

/// Best-effort text from a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::WriteParams;
    use crate::llm::{FakeCompletionService, LlmError};
    use serde_json::json;

    fn classifier(output: &str) -> IntentClassifier {
        IntentClassifier::new(Box::new(FakeCompletionService::always(output)))
    }

    struct PanickingService;

    impl CompletionService for PanickingService {
        fn generate(&self, _: &str, _: &GenerationOptions) -> Result<String, LlmError> {
            panic!("backend exploded");
        }
    }

    #[test]
    fn test_prompt_contains_tools_and_input() {
        let prompt = build_prompt("read README.md");
        assert!(prompt.contains("execute_command"));
        assert!(prompt.contains("parameters MUST be empty"));
        assert!(prompt.ends_with("User command: read README.md\n\nJSON response:"));
    }

    #[test]
    fn test_extract_json_with_commentary() {
        let text = concat!(
            r#"Sure! Here you go: {"intent": "read_file", "parameters": {"path": "a.txt"}}"#,
            r#" hope it helps {"x": 1}"#
        );
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["intent"], "read_file");
    }

    #[test]
    fn test_extract_json_failures() {
        assert!(extract_json_object("no braces here").is_none());
        assert!(extract_json_object("{not json}").is_none());
        assert!(extract_json_object("{\"intent\": \"chat\"").is_none());
    }

    #[test]
    fn test_well_formed_json() {
        let c = classifier(
            r#"{"intent":"execute_command","parameters":{"command":"dir","extra":1},"confidence":0.85}"#,
        );
        let intent = c.classify("run dir");
        assert_eq!(intent.name(), "execute_command");
        assert_eq!(intent.parameters(), json!({"command": "dir"}).as_object().cloned().unwrap());
        assert!((intent.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_chat_parameters_dropped() {
        let c = classifier(r#"{"intent":"chat","parameters":{"foo":"bar"},"confidence":0.9}"#);
        let intent = c.classify("hello");
        assert_eq!(intent.action, Action::Chat);
        assert!(intent.parameters().is_empty());
        assert!((intent.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_confidence_defaults() {
        let c = classifier(r#"{"intent":"read_file","parameters":{"path":"x"}}"#);
        assert!((c.classify("read x").confidence - DEFAULT_JSON_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let c = classifier(r#"{"intent":"read_file","parameters":{"path":"x"},"confidence":5.0}"#);
        assert_eq!(c.classify("read x").confidence, 1.0);

        let c = classifier(r#"{"intent":"read_file","parameters":{"path":"x"},"confidence":-2}"#);
        assert_eq!(c.classify("read x").confidence, 0.0);
    }

    #[test]
    fn test_unknown_intent_passes_through() {
        let c =
            classifier(r#"{"intent":"send_email","parameters":{"to":"a@b.c"},"confidence":0.8}"#);
        let intent = c.classify("email bob");
        assert_eq!(intent.name(), "send_email");
        assert_eq!(intent.kind(), None);
    }

    #[test]
    fn test_missing_intent_field_falls_back() {
        let c = classifier(r#"{"parameters":{"path":"x"}}"#);
        let intent = c.classify("read README.md");
        assert_eq!(intent.action, Action::ReadFile(PathParams { path: Some("README.md".into()) }));
        assert_eq!(intent.confidence, FALLBACK_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_run_dir_fallback() {
        let c = classifier("Sure thing!");
        let intent = c.classify("run dir");
        assert_eq!(
            intent.action,
            Action::ExecuteCommand(CommandParams { command: Some("dir".into()) })
        );
        assert_eq!(intent.confidence, FALLBACK_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_read_fallback() {
        let c = classifier("");
        let intent = c.classify("read README.md");
        assert_eq!(intent.action, Action::ReadFile(PathParams { path: Some("README.md".into()) }));
        assert_eq!(intent.confidence, FALLBACK_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_model_output_scanned_before_user_text() {
        let c = classifier("execute cargo test");
        let intent = c.classify("please do the thing");
        assert_eq!(
            intent.action,
            Action::ExecuteCommand(CommandParams { command: Some("cargo test".into()) })
        );
    }

    #[test]
    fn test_command_capture_stops_at_line_end() {
        let c = classifier("I will run dir\nThis lists the files in the folder.");
        let intent = c.classify("please show me the files");
        assert_eq!(
            intent.action,
            Action::ExecuteCommand(CommandParams { command: Some("dir".into()) })
        );
    }

    #[test]
    fn test_read_capture_stops_at_line_end() {
        let c = classifier("I will read notes.txt\r\nThen summarize it for you.");
        let intent = c.classify("what is in my notes");
        assert_eq!(intent.action, Action::ReadFile(PathParams { path: Some("notes.txt".into()) }));
    }

    #[test]
    fn test_list_capture_stops_at_line_end() {
        let intent = fallback_recognition("list src\nand then report back");
        assert_eq!(intent.action, Action::ListDirectory(PathParams { path: Some("src".into()) }));
    }

    #[test]
    fn test_command_pattern_in_broken_json() {
        let intent =
            fallback_recognition(r#"{"intent": "execute_command", "command": "echo hi", oops"#);
        assert_eq!(
            intent.action,
            Action::ExecuteCommand(CommandParams { command: Some("echo hi".into()) })
        );
    }

    #[test]
    fn test_list_default_path() {
        let intent = fallback_recognition("directory");
        assert_eq!(intent.action, Action::ListDirectory(PathParams { path: Some(".".into()) }));
        assert_eq!(intent.confidence, FALLBACK_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_list_with_path() {
        let intent = fallback_recognition("list examples");
        assert_eq!(
            intent.action,
            Action::ListDirectory(PathParams { path: Some("examples".into()) })
        );
    }

    #[test]
    fn test_command_keyword_without_pattern_falls_through() {
        // "dir" is a command keyword but no run/execute pattern follows
        let intent = fallback_recognition("show the dir");
        assert_eq!(intent.action, Action::ReadFile(PathParams { path: Some("the dir".into()) }));
    }

    #[test]
    fn test_chat_default() {
        let intent = fallback_recognition("hello there");
        assert_eq!(intent.action, Action::Chat);
        assert_eq!(intent.confidence, FALLBACK_CHAT_CONFIDENCE);
    }

    #[test]
    fn test_fallback_confidences_are_fixed() {
        for text in [
            "run ls",
            "execute make",
            "cat notes.txt",
            "list src",
            "ls",
            "good morning",
            "what is the weather",
            "",
        ] {
            let intent = fallback_recognition(text);
            assert!(
                intent.confidence == FALLBACK_MATCH_CONFIDENCE
                    || intent.confidence == FALLBACK_CHAT_CONFIDENCE,
                "unexpected confidence for {:?}",
                text
            );
            assert!(!matches!(intent.action, Action::WriteFile(WriteParams { .. })));
        }
    }

    #[test]
    fn test_service_error_uses_user_text() {
        let c = IntentClassifier::new(Box::new(FakeCompletionService::always_error(
            LlmError::HttpError("connection refused".into()),
        )));
        let detailed = c.classify_detailed("run dir");
        assert!(detailed.used_fallback);
        assert!(detailed.raw_response.is_none());
        assert_eq!(detailed.intent.name(), "execute_command");
    }

    #[test]
    fn test_service_panic_yields_error_intent() {
        let c = IntentClassifier::new(Box::new(PanickingService));
        let intent = c.classify("run dir");
        assert_eq!(intent.name(), "error");
        assert_eq!(intent.confidence, 0.0);
        match intent.action {
            Action::Error(reason) => assert!(reason.contains("backend exploded")),
            other => panic!("unexpected action {:?}", other),
        }
    }
}
