//! Wardenctl - natural-language system agent CLI
//!
//! Runs synchronously: the completion client and the process executor each
//! block on their own I/O, so there is no async runtime at this level.

use clap::Parser;
use owo_colors::OwoColorize;
use wardenctl::cli::Cli;
use wardenctl::{commands, errors, logging};

fn main() {
    let cli = Cli::parse();
    logging::init();

    let code = match commands::dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".bright_red().bold(), e);
            errors::exit_code_for(&e)
        }
    };

    std::process::exit(code);
}
