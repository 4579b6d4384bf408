//! Exit codes for wardenctl
//!
//! Only initialization failures map to distinct codes; problems inside a
//! turn are reported in the response text.

use warden_common::WardenError;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code when the completion backend is unavailable/unreachable
pub const EXIT_BACKEND_UNAVAILABLE: i32 = 70;

/// Exit code for configuration or policy errors
pub const EXIT_CONFIG_ERROR: i32 = 78;

/// Exit code after Ctrl-C (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// Map a top-level error to the process exit code
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<WardenError>() {
        Some(WardenError::Config(_)) | Some(WardenError::Policy(_)) => EXIT_CONFIG_ERROR,
        Some(WardenError::Backend(_)) => EXIT_BACKEND_UNAVAILABLE,
        _ => EXIT_GENERAL_ERROR,
    }
}
