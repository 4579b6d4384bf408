//! Warden Common - natural-language system agent core
//!
//! Free text in, one response out: classify the request into a typed
//! intent, check it against the safety policy, ask for confirmation when
//! needed, dispatch it through the tool router and record the turn in the
//! audit log.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod router;
pub mod safety;
pub mod tools;

pub use audit::{AuditEntry, AuditLog};
pub use classifier::IntentClassifier;
pub use config::WardenConfig;
pub use error::{Result, WardenError};
pub use intent::{Action, Intent, IntentKind};
pub use llm::{CompletionService, FakeCompletionService, HttpCompletionService};
pub use orchestrator::{Confirmer, Orchestrator};
pub use router::{ExecutionOutcome, Handler, RouteResult, Tool, ToolRouter};
pub use safety::{SafetyDecision, SafetyPolicy};
