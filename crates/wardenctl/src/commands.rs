//! Subcommand handlers
//!
//! Each handler returns the process exit code. Initialization problems are
//! returned as `WardenError` so `main` can map them.

use crate::cli::{Cli, Commands};
use crate::confirm::{PromptConfirmer, TerminalInput};
use crate::errors::{EXIT_GENERAL_ERROR, EXIT_SUCCESS};
use crate::{interrupt, repl};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::io;
use tracing::{info, warn};
use warden_common::audit::tail_file;
use warden_common::files::FileOperator;
use warden_common::orchestrator::AutoConfirmer;
use warden_common::tools::{builtin_router, ToolContext};
use warden_common::{
    CompletionService, Confirmer, HttpCompletionService, IntentClassifier, Orchestrator,
    SafetyDecision, SafetyPolicy, WardenConfig, WardenError,
};

/// Run the selected subcommand
pub fn dispatch(cli: &Cli) -> Result<i32> {
    let config = load_config(cli)?;

    match cli.command() {
        Commands::Chat => {
            let mut orch = build_orchestrator(cli, &config)?;
            interrupt::install(orch.audit().closer());
            repl::run(&mut orch, TerminalInput, io::stdout())?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Ask { text } => {
            let mut orch = build_orchestrator(cli, &config)?;
            interrupt::install(orch.audit().closer());
            let response = orch.process_turn(&text.join(" "));
            println!("{}", response);
            orch.end_session();
            Ok(EXIT_SUCCESS)
        }
        Commands::Classify { text } => {
            let classifier = IntentClassifier::new(completion_service(cli, &config)?)
                .with_options((&config.model).into());
            let classification = classifier.classify_detailed(&text.join(" "));
            if classification.used_fallback {
                info!("Intent came from keyword fallback");
            }
            let intent = classification.intent.to_json();
            println!("{}", serde_json::to_string_pretty(&intent)?);
            Ok(EXIT_SUCCESS)
        }
        Commands::CheckPath { path } => {
            let policy = SafetyPolicy::from_config(&config.security)?;
            Ok(report_decision(&policy.check_path(&path))?)
        }
        Commands::CheckCommand { command } => {
            let policy = SafetyPolicy::from_config(&config.security)?;
            Ok(report_decision(&policy.check_command(&command.join(" ")))?)
        }
        Commands::Info { path } => file_info(&config, &path),
        Commands::Tools => {
            for name in wired_tools(&config)? {
                println!("{}", name);
            }
            Ok(EXIT_SUCCESS)
        }
        Commands::Log { lines } => show_log(&config, lines),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(EXIT_SUCCESS)
        }
    }
}

/// Load configuration; any failure is a configuration error
pub fn load_config(cli: &Cli) -> Result<WardenConfig, WardenError> {
    WardenConfig::load(cli.config.as_deref())
        .map_err(|e| WardenError::Config(format!("{:#}", e)))
}

fn completion_service(
    cli: &Cli,
    config: &WardenConfig,
) -> Result<Box<dyn CompletionService>, WardenError> {
    let service = HttpCompletionService::new(config.model.clone())
        .map_err(|e| WardenError::Backend(e.to_string()))?;

    if cli.skip_health_check {
        return Ok(Box::new(service));
    }

    service
        .health_check()
        .map_err(|e| WardenError::Backend(format!("{} ({})", e, config.model.endpoint)))?;
    Ok(Box::new(service))
}

fn confirmer(cli: &Cli) -> Box<dyn Confirmer> {
    if cli.yes {
        warn!("Confirmation prompts disabled (--yes)");
        Box::new(AutoConfirmer)
    } else {
        Box::new(PromptConfirmer::stdio())
    }
}

fn build_orchestrator(cli: &Cli, config: &WardenConfig) -> Result<Orchestrator, WardenError> {
    let service = completion_service(cli, config)?;
    Orchestrator::from_config(config, service, confirmer(cli))
}

/// Print a safety decision as JSON; exit code 1 when blocked
pub fn report_decision(decision: &SafetyDecision) -> Result<i32, serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(decision)?);
    Ok(if decision.is_allowed {
        EXIT_SUCCESS
    } else {
        EXIT_GENERAL_ERROR
    })
}

/// Tool names served by the router the orchestrator would use
pub fn wired_tools(config: &WardenConfig) -> Result<Vec<String>, WardenError> {
    let policy = SafetyPolicy::from_config(&config.security)?;
    let ctx = ToolContext::from_config(config, &policy)?;
    Ok(builtin_router(&ctx).list_tools())
}

/// Print file details as JSON; exit code 1 when the path is unusable
pub fn file_info(config: &WardenConfig, path: &str) -> Result<i32> {
    let policy = SafetyPolicy::from_config(&config.security)?;
    let files = FileOperator::new(policy, config.files.max_file_size, config.files.show_hidden);

    match files.info(path) {
        Ok(info) => {
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {}", "✗".bright_red(), e);
            Ok(EXIT_GENERAL_ERROR)
        }
    }
}

fn show_log(config: &WardenConfig, lines: usize) -> Result<i32> {
    let path = &config.logging.log_file;
    if !path.exists() {
        println!("{} {}", "No audit log at".yellow(), path.display());
        return Ok(EXIT_SUCCESS);
    }
    println!("{}", tail_file(path, lines)?);
    Ok(EXIT_SUCCESS)
}
