//! Command-line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wardenctl")]
#[command(about = "Warden - natural-language system agent", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: $WARDEN_CONFIG, ./config/warden.toml, ~/.config/warden/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Approve every confirmation prompt
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Do not probe the completion backend at startup
    #[arg(long, global = true)]
    pub skip_health_check: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Interactive session (default)
    Chat,

    /// Run a single request and exit
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Print the recognized intent as JSON
    Classify {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Check a path against the safety policy
    CheckPath { path: String },

    /// Check a shell command against the safety policy
    CheckCommand {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show name, kind, size and modification time of a path
    Info { path: String },

    /// List registered tools
    Tools,

    /// Show the end of the audit log
    Log {
        #[arg(long, default_value_t = 100)]
        lines: usize,
    },

    /// Print the effective configuration
    Config,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Chat)
    }
}
