// SPDX-License-Identifier: MIT OR Apache-2.0
//! crudd-exec
//!
//! Runs one catalog command per request and streams its output.
//!
//! The pieces, leaf first:
//!
//! * [`launch`] starts the subprocess with stdout and stderr piped and merges
//!   them into one [`OutputStream`] of lines. It never fails: a command that
//!   cannot be started yields a one-line error stream and
//!   [`LAUNCH_FAILURE_EXIT_CODE`].
//! * [`relay`] drains that stream into an [`OutputSink`], escaping and
//!   flushing every line.
//! * [`CommandRun`] sequences header, relay, exit wait, status line, and
//!   footer, and ties the whole thing to a request's [`CancelToken`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod coordinator;
mod error;
/// HTML escaping for command output.
pub mod escape;
mod launch;
mod lines;
mod relay;
mod sink;

pub use cancel::CancelToken;
pub use coordinator::{CommandRun, RunPhase, RunReport};
pub use error::ExecError;
pub use escape::escape_html;
pub use launch::{
    LAUNCH_FAILURE_EXIT_CODE, LaunchSpec, OutputStream, RunningProcess, SIGNAL_EXIT_CODE, launch,
};
pub use lines::MAX_LINE_BYTES;
pub use relay::{RelayEnd, RelayOutcome, relay};
pub use sink::{ChannelSink, MemorySink, OutputSink};

/// Trailing status line written after a command exits.
pub fn exit_status_line(code: i32) -> String {
    format!("\nCommand exited with code: {code}")
}
