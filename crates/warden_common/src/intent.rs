//! Intent model
//!
//! An intent is what the user wants done: a name from the fixed tool
//! vocabulary, a typed parameter record for that name, and a confidence.
//! Parameter parsing keeps only the canonical keys for the name and never
//! invents missing ones. Names outside the vocabulary pass through as
//! `Action::Custom` with their parameters untouched; routing decides
//! whether anything handles them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Canonical intent names
pub const EXECUTE_COMMAND: &str = "execute_command";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const RUN_PYTHON: &str = "run_python";
pub const CHAT: &str = "chat";
pub const ERROR: &str = "error";

/// Default path for `list_directory` when none was given
pub const DEFAULT_LIST_PATH: &str = ".";

/// Canonical intent kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    ExecuteCommand,
    ReadFile,
    WriteFile,
    ListDirectory,
    RunPython,
    Chat,
    Error,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecuteCommand => EXECUTE_COMMAND,
            Self::ReadFile => READ_FILE,
            Self::WriteFile => WRITE_FILE,
            Self::ListDirectory => LIST_DIRECTORY,
            Self::RunPython => RUN_PYTHON,
            Self::Chat => CHAT,
            Self::Error => ERROR,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            EXECUTE_COMMAND => Some(Self::ExecuteCommand),
            READ_FILE => Some(Self::ReadFile),
            WRITE_FILE => Some(Self::WriteFile),
            LIST_DIRECTORY => Some(Self::ListDirectory),
            RUN_PYTHON => Some(Self::RunPython),
            CHAT => Some(Self::Chat),
            ERROR => Some(Self::Error),
            _ => None,
        }
    }

    /// Canonical parameter keys for this kind
    pub fn parameter_keys(&self) -> &'static [&'static str] {
        match self {
            Self::ExecuteCommand => &["command"],
            Self::ReadFile | Self::ListDirectory => &["path"],
            Self::WriteFile => &["path", "content"],
            Self::RunPython => &["code"],
            Self::Chat | Self::Error => &[],
        }
    }

    /// Kinds that change the system or run code
    pub fn is_side_effecting(&self) -> bool {
        matches!(self, Self::ExecuteCommand | Self::WriteFile | Self::RunPython)
    }

    /// All kinds, in prompt order
    pub fn all() -> &'static [IntentKind] {
        &[
            Self::ExecuteCommand,
            Self::ReadFile,
            Self::WriteFile,
            Self::ListDirectory,
            Self::RunPython,
            Self::Chat,
            Self::Error,
        ]
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandParams {
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathParams {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteParams {
    pub path: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeParams {
    pub code: Option<String>,
}

/// What the intent asks for, with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ExecuteCommand(CommandParams),
    ReadFile(PathParams),
    WriteFile(WriteParams),
    ListDirectory(PathParams),
    RunPython(CodeParams),
    Chat,
    /// Classification failed; carries the reason
    Error(String),
    /// A name outside the canonical vocabulary
    Custom {
        name: String,
        parameters: Map<String, Value>,
    },
}

impl Action {
    /// Build an action from a name and a raw parameter object.
    ///
    /// Unknown keys are dropped for canonical names; chat always ends up
    /// with no parameters.
    pub fn from_parts(name: &str, parameters: &Map<String, Value>) -> Self {
        match IntentKind::from_name(name) {
            Some(IntentKind::ExecuteCommand) => Action::ExecuteCommand(CommandParams {
                command: string_param(parameters, "command"),
            }),
            Some(IntentKind::ReadFile) => Action::ReadFile(PathParams {
                path: string_param(parameters, "path"),
            }),
            Some(IntentKind::WriteFile) => Action::WriteFile(WriteParams {
                path: string_param(parameters, "path"),
                content: string_param(parameters, "content"),
            }),
            Some(IntentKind::ListDirectory) => Action::ListDirectory(PathParams {
                path: string_param(parameters, "path"),
            }),
            Some(IntentKind::RunPython) => Action::RunPython(CodeParams {
                code: string_param(parameters, "code"),
            }),
            Some(IntentKind::Chat) => Action::Chat,
            Some(IntentKind::Error) => Action::Error(
                string_param(parameters, "reason").unwrap_or_else(|| "unknown error".to_string()),
            ),
            None => Action::Custom {
                name: name.to_string(),
                parameters: parameters.clone(),
            },
        }
    }

    pub fn kind(&self) -> Option<IntentKind> {
        match self {
            Action::ExecuteCommand(_) => Some(IntentKind::ExecuteCommand),
            Action::ReadFile(_) => Some(IntentKind::ReadFile),
            Action::WriteFile(_) => Some(IntentKind::WriteFile),
            Action::ListDirectory(_) => Some(IntentKind::ListDirectory),
            Action::RunPython(_) => Some(IntentKind::RunPython),
            Action::Chat => Some(IntentKind::Chat),
            Action::Error(_) => Some(IntentKind::Error),
            Action::Custom { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Action::Custom { name, .. } => name,
            other => other.kind().map(|k| k.as_str()).unwrap_or(ERROR),
        }
    }

    /// Wire view of the parameters (present keys only)
    pub fn parameters(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), Value::String(v.clone()));
            }
        };

        match self {
            Action::ExecuteCommand(p) => put("command", &p.command),
            Action::ReadFile(p) | Action::ListDirectory(p) => put("path", &p.path),
            Action::WriteFile(p) => {
                put("path", &p.path);
                put("content", &p.content);
            }
            Action::RunPython(p) => put("code", &p.code),
            Action::Chat | Action::Error(_) => {}
            Action::Custom { parameters, .. } => return parameters.clone(),
        }
        map
    }
}

/// Recognized user intent
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: Action,
    pub confidence: f64,
}

impl Intent {
    pub fn new(action: Action, confidence: f64) -> Self {
        Self { action, confidence }
    }

    /// Build from a name and raw parameters, applying parameter validation
    pub fn from_parts(name: &str, parameters: &Map<String, Value>, confidence: f64) -> Self {
        Self::new(Action::from_parts(name, parameters), confidence)
    }

    pub fn chat(confidence: f64) -> Self {
        Self::new(Action::Chat, confidence)
    }

    /// Classification failure
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Action::Error(reason.into()), 0.0)
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn kind(&self) -> Option<IntentKind> {
        self.action.kind()
    }

    pub fn parameters(&self) -> Map<String, Value> {
        self.action.parameters()
    }

    /// JSON view used by diagnostics
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("intent".to_string(), Value::String(self.name().to_string()));
        obj.insert("parameters".to_string(), Value::Object(self.parameters()));
        obj.insert("confidence".to_string(), serde_json::json!(self.confidence));
        if let Action::Error(reason) = &self.action {
            obj.insert("error".to_string(), Value::String(reason.clone()));
        }
        Value::Object(obj)
    }
}

fn string_param(parameters: &Map<String, Value>, key: &str) -> Option<String> {
    parameters
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
