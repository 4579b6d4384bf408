//! Diagnostic logging for wardenctl
//!
//! `tracing` output goes to stderr so it never mixes with responses.
//! Filter comes from `$WARDEN_LOG` (e.g. `WARDEN_LOG=debug`), default `warn`.
//! The audit log is separate and always written by the orchestrator.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter
pub const LOG_ENV: &str = "WARDEN_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber; later calls are ignored
pub fn init() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
