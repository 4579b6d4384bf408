//! Ctrl-C handling
//!
//! A watcher thread waits for the signal on its own current-thread runtime,
//! writes the session end and exits with 130. The turn loop itself stays
//! synchronous.

use crate::errors::EXIT_INTERRUPTED;
use owo_colors::OwoColorize;
use std::thread;
use tracing::{debug, warn};
use warden_common::audit::SessionCloser;

/// Start the watcher for one session
pub fn install(closer: SessionCloser) {
    let spawned = thread::Builder::new()
        .name("warden-interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Ctrl-C handler unavailable: {}", e);
                    return;
                }
            };

            if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
                warn!("Ctrl-C handler unavailable: {}", e);
                return;
            }

            on_interrupt(&closer);
            std::process::exit(EXIT_INTERRUPTED);
        });

    if let Err(e) = spawned {
        warn!("Ctrl-C handler unavailable: {}", e);
    }
}

/// Report the interruption and end the session.
///
/// Returns false when the session had already ended.
pub fn on_interrupt(closer: &SessionCloser) -> bool {
    eprintln!("\n\n{}", "⚠️  Session interrupted".yellow().bold());
    let closed = closer.close();
    debug!("Interrupted, session end written: {}", closed);
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use warden_common::AuditLog;

    #[test]
    fn test_interrupt_writes_session_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_log.txt");
        let mut log = AuditLog::open(&path).unwrap();
        log.log_error("orchestrator", "Agent error: boom");

        assert!(on_interrupt(&log.closer()));
        assert!(log.is_ended());
        // Normal shutdown afterwards does not write a second end
        assert!(!log.end_session());

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("Session Ended: ").count(), 1);
        assert!(contents.trim_end().ends_with(&"=".repeat(80)));
    }
}
