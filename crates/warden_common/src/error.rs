//! Error types for Warden.
//!
//! Only initialization failures are fatal. Everything that can go wrong
//! inside a turn is recovered into an outcome or a response string.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Completion backend unavailable: {0}")]
    Backend(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
