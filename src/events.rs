//! Sample types produced by the diagnostic commands
//!
//! The captured tool output is kept as opaque text; nothing here parses
//! `iostat` or `iotop` columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the crate
pub type Timestamp = DateTime<Utc>;

/// Exit code reported when a command could not be run to completion
pub const FAILED_EXIT_CODE: i32 = -1;

/// Outcome of a single diagnostic command invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleResult {
    /// The shell command that was executed
    pub command: String,
    /// Process exit code, or [`FAILED_EXIT_CODE`] when the process could not
    /// be spawned, waited on, or was killed by a signal
    pub exit_code: i32,
    /// Everything the command wrote to standard output
    pub stdout: String,
    /// Everything the command wrote to standard error, or the failure
    /// description when the command could not be run
    pub stderr: String,
    /// When the command finished
    pub captured_at: Timestamp,
}

impl SampleResult {
    pub fn new(command: &str, exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
            captured_at: Utc::now(),
        }
    }

    /// Build the sentinel result for a command that never produced output
    pub fn failed(command: &str, reason: impl Into<String>) -> Self {
        Self::new(command, FAILED_EXIT_CODE, String::new(), reason.into())
    }

    /// Whether the command exited with status zero
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
