// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for command execution.

use thiserror::Error;

/// Errors from launching, reading, and reaping a command.
///
/// None of these escape a request: launch errors become inline output and
/// the rest are logged.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Resolved executable path.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A standard stream could not be captured.
    #[error("failed to get {stream} pipe for command {program}")]
    Pipe {
        /// `"stdout"` or `"stderr"`.
        stream: &'static str,
        /// Resolved executable path.
        program: String,
    },

    /// Reading command output failed.
    #[error("failed to stream output: {0}")]
    Read(#[source] std::io::Error),

    /// Waiting for the command to exit failed.
    #[error("failed to wait for command: {0}")]
    Wait(#[source] std::io::Error),
}
