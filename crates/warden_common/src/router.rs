//! Tool Router
//!
//! Maps intent names to handlers. Routing is a pure check (is there a
//! handler, is the confidence high enough); execution dispatches the typed
//! action to the matching handler and turns every failure, including a
//! panicking handler, into an `ExecutionOutcome`.
//!
//! The registry starts with a placeholder for every canonical name. Real
//! handlers are upserted by name at startup; the last registration wins.

use crate::classifier::panic_message;
use crate::intent::{
    Action, CodeParams, CommandParams, Intent, IntentKind, PathParams, WriteParams,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Minimum confidence for dispatch (inclusive)
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

// =============================================================================
// Handler types
// =============================================================================

/// What a handler produced
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Whether the operation itself succeeded
    pub success: bool,
    /// Text shown to the user on success
    pub display: String,
    pub payload: Value,
    /// Failure message when `success` is false
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(display: impl Into<String>, payload: Value) -> Self {
        Self {
            success: true,
            display: display.into(),
            payload,
            error: None,
        }
    }

    /// The handler ran but the operation failed
    pub fn failed(error: impl Into<String>, payload: Value) -> Self {
        Self {
            success: false,
            display: String::new(),
            payload,
            error: Some(error.into()),
        }
    }
}

/// Handler could not run
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("No implementation registered for {0}")]
    NotImplemented(String),

    #[error("Handler {handler} cannot handle intent {intent}")]
    Mismatch { handler: String, intent: String },

    #[error("{0}")]
    Failed(String),
}

pub type ToolResult = Result<ToolOutput, ToolError>;

/// Runtime-registered tool working on raw JSON parameters
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, parameters: &Map<String, Value>) -> ToolResult;
}

pub type HandlerFn<P> = Box<dyn Fn(&P) -> ToolResult + Send + Sync>;

/// Handler for one intent name
pub enum Handler {
    ExecuteCommand(HandlerFn<CommandParams>),
    ReadFile(HandlerFn<PathParams>),
    WriteFile(HandlerFn<WriteParams>),
    ListDirectory(HandlerFn<PathParams>),
    RunPython(HandlerFn<CodeParams>),
    Chat(Box<dyn Fn() -> ToolResult + Send + Sync>),
    Error(Box<dyn Fn(&str) -> ToolResult + Send + Sync>),
    Custom(Box<dyn Tool>),
}

impl Handler {
    pub fn name(&self) -> &str {
        match self {
            Handler::ExecuteCommand(_) => IntentKind::ExecuteCommand.as_str(),
            Handler::ReadFile(_) => IntentKind::ReadFile.as_str(),
            Handler::WriteFile(_) => IntentKind::WriteFile.as_str(),
            Handler::ListDirectory(_) => IntentKind::ListDirectory.as_str(),
            Handler::RunPython(_) => IntentKind::RunPython.as_str(),
            Handler::Chat(_) => IntentKind::Chat.as_str(),
            Handler::Error(_) => IntentKind::Error.as_str(),
            Handler::Custom(tool) => tool.name(),
        }
    }

    /// Handler that reports it has no implementation
    pub fn placeholder(kind: IntentKind) -> Self {
        let name = kind.as_str();
        match kind {
            IntentKind::ExecuteCommand => Handler::ExecuteCommand(not_implemented(name)),
            IntentKind::ReadFile => Handler::ReadFile(not_implemented(name)),
            IntentKind::WriteFile => Handler::WriteFile(not_implemented(name)),
            IntentKind::ListDirectory => Handler::ListDirectory(not_implemented(name)),
            IntentKind::RunPython => Handler::RunPython(not_implemented(name)),
            IntentKind::Chat => Handler::Chat(Box::new(move || -> ToolResult {
                Err(ToolError::NotImplemented(name.to_string()))
            })),
            IntentKind::Error => Handler::Error(Box::new(|reason: &str| -> ToolResult {
                Err(ToolError::Failed(format!("Intent recognition failed: {}", reason)))
            })),
        }
    }
}

fn not_implemented<P: 'static>(name: &'static str) -> HandlerFn<P> {
    Box::new(move |_: &P| -> ToolResult {
        Err(ToolError::NotImplemented(name.to_string()))
    })
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({})", self.name())
    }
}

// =============================================================================
// Results
// =============================================================================

/// Routing decision; never executes anything
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub accepted: bool,
    pub handler_name: Option<String>,
    pub message: String,
    pub parameters: Map<String, Value>,
}

/// Result of executing an intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// User-facing response text
    pub display: String,
}

impl ExecutionOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            payload: None,
            display: format!("❌ {}", error),
            error: Some(error),
        }
    }

    fn from_output(output: ToolOutput) -> Self {
        if output.success {
            return Self {
                success: true,
                payload: Some(output.payload),
                error: None,
                display: output.display,
            };
        }

        let error = output
            .error
            .unwrap_or_else(|| "Operation failed".to_string());
        Self {
            success: false,
            payload: Some(output.payload),
            display: format!("❌ {}", error),
            error: Some(error),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Intent name → handler registry
#[derive(Debug)]
pub struct ToolRouter {
    handlers: HashMap<String, Handler>,
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRouter {
    /// Router with placeholders for every canonical name
    pub fn new() -> Self {
        let mut router = Self {
            handlers: HashMap::new(),
        };
        for kind in IntentKind::all() {
            router.register(Handler::placeholder(*kind));
        }
        router
    }

    /// Insert or replace the handler for its name
    pub fn register(&mut self, handler: Handler) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            debug!("Replaced handler for {}", name);
        }
    }

    /// Registered names, sorted
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Decide whether an intent would be dispatched
    pub fn route(&self, intent: &Intent) -> RouteResult {
        let name = intent.name();
        let parameters = intent.parameters();

        if !self.handlers.contains_key(name) {
            return RouteResult {
                accepted: false,
                handler_name: None,
                message: format!("Unknown tool: {}", name),
                parameters,
            };
        }

        if intent.confidence < CONFIDENCE_THRESHOLD {
            return RouteResult {
                accepted: false,
                handler_name: Some(name.to_string()),
                message: format!(
                    "Low confidence ({:.2}) for intent: {}",
                    intent.confidence, name
                ),
                parameters,
            };
        }

        RouteResult {
            accepted: true,
            handler_name: Some(name.to_string()),
            message: format!("Routed to {} (confidence: {:.2})", name, intent.confidence),
            parameters,
        }
    }

    /// Route, then dispatch to the handler
    pub fn execute(&self, intent: &Intent) -> ExecutionOutcome {
        let route = self.route(intent);
        if !route.accepted {
            return ExecutionOutcome::failure(route.message);
        }

        let handler = match self.handlers.get(intent.name()) {
            Some(handler) => handler,
            None => return ExecutionOutcome::failure(format!("Unknown tool: {}", intent.name())),
        };

        debug!("{}", route.message);
        let result = panic::catch_unwind(AssertUnwindSafe(|| dispatch(handler, &intent.action)));

        match result {
            Ok(Ok(output)) => ExecutionOutcome::from_output(output),
            Ok(Err(e)) => ExecutionOutcome::failure(format!("Execution error: {}", e)),
            Err(payload) => ExecutionOutcome::failure(format!(
                "Execution error: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

fn dispatch(handler: &Handler, action: &Action) -> ToolResult {
    match (handler, action) {
        (Handler::Custom(tool), action) => tool.invoke(&action.parameters()),
        (Handler::ExecuteCommand(f), Action::ExecuteCommand(p)) => f(p),
        (Handler::ReadFile(f), Action::ReadFile(p)) => f(p),
        (Handler::WriteFile(f), Action::WriteFile(p)) => f(p),
        (Handler::ListDirectory(f), Action::ListDirectory(p)) => f(p),
        (Handler::RunPython(f), Action::RunPython(p)) => f(p),
        (Handler::Chat(f), Action::Chat) => f(),
        (Handler::Error(f), Action::Error(reason)) => f(reason),
        (handler, action) => Err(ToolError::Mismatch {
            handler: handler.name().to_string(),
            intent: action.name().to_string(),
        }),
    }
}
