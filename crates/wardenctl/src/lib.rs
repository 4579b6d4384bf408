//! Wardenctl library - exposes modules for testing

pub mod cli;
pub mod commands;
pub mod confirm;
pub mod errors;
pub mod interrupt;
pub mod logging;
pub mod repl;
