// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request-scoped lifecycle of one command run.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::exit_status_line;
use crate::launch::{LaunchSpec, launch};
use crate::relay::{RelayEnd, relay};
use crate::sink::OutputSink;

/// Phases of a run; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    /// Header written, command not yet started.
    Starting,
    /// Output is being relayed.
    Streaming,
    /// Output finished or the request was cancelled; reaping the process.
    AwaitingExit,
    /// Exit code known, status line and footer written.
    Done,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// The single exit code produced for this run.
    pub exit_code: i32,
    /// Output lines delivered to the client.
    pub lines: usize,
    /// Why relaying stopped.
    pub relay_end: RelayEnd,
    /// Whether the request was cancelled at any point.
    pub cancelled: bool,
    /// Whether the command never started.
    pub launch_failed: bool,
    /// Wall time from launch to exit.
    pub elapsed: Duration,
}

/// One command execution bound to one response.
///
/// ```no_run
/// # async fn demo() {
/// use crudd_exec::{CancelToken, CommandRun, LaunchSpec, MemorySink};
///
/// let mut sink = MemorySink::new();
/// let report = CommandRun::new(LaunchSpec::new("/usr/bin/uptime"))
///     .header("<pre>")
///     .footer("</pre>")
///     .execute(&mut sink, CancelToken::new())
///     .await;
/// println!("exit {}", report.exit_code);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CommandRun {
    spec: LaunchSpec,
    header: String,
    footer: String,
    verbose: bool,
    phase: RunPhase,
}

impl CommandRun {
    /// Prepare a run of `spec` with an empty header and footer.
    pub fn new(spec: LaunchSpec) -> Self {
        Self {
            spec,
            header: String::new(),
            footer: String::new(),
            verbose: false,
            phase: RunPhase::Starting,
        }
    }

    /// Markup written and flushed before any output.
    pub fn header(mut self, html: impl Into<String>) -> Self {
        self.header = html.into();
        self
    }

    /// Markup written after the exit status line.
    pub fn footer(mut self, html: impl Into<String>) -> Self {
        self.footer = html.into();
        self
    }

    /// Log every relayed line.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Drive the run to completion.
    ///
    /// Always reaches [`RunPhase::Done`] and always reaps the process, even
    /// when `cancel` fires or the sink fails midway. Writes after a client
    /// disconnect are best-effort.
    pub async fn execute<S>(mut self, sink: &mut S, cancel: CancelToken) -> RunReport
    where
        S: OutputSink + ?Sized,
    {
        let program = self.spec.program.display().to_string();
        let grace = self.spec.grace_period;
        if !emit_within(sink, self.header.as_bytes(), &cancel, grace).await {
            cancel.cancel();
        }

        let started = Instant::now();
        let mut process = launch(&self.spec, cancel.clone());
        let launch_failed = process.launch_error().is_some();
        self.enter(RunPhase::Streaming);

        let outcome = relay(&mut process.output, sink, &cancel, self.verbose).await;
        process.mark_drained();
        self.enter(RunPhase::AwaitingExit);

        let exit_code = process.wait_exit().await;
        let elapsed = started.elapsed();
        info!(
            target: "crudd.exec",
            program = %program,
            exit_code,
            elapsed_us = elapsed.as_micros() as u64,
            lines = outcome.lines,
            "Command took {elapsed:?} to run and exited with code {exit_code}"
        );
        self.enter(RunPhase::Done);

        let status = exit_status_line(exit_code);
        if emit_within(sink, status.as_bytes(), &cancel, grace).await {
            emit_within(sink, self.footer.as_bytes(), &cancel, grace).await;
        }

        RunReport {
            exit_code,
            lines: outcome.lines,
            relay_end: outcome.end,
            cancelled: cancel.is_cancelled(),
            launch_failed,
            elapsed,
        }
    }

    fn enter(&mut self, next: RunPhase) {
        debug_assert!(next > self.phase, "{:?} -> {next:?}", self.phase);
        debug!(target: "crudd.exec", from = ?self.phase, to = ?next, "run phase");
        self.phase = next;
    }
}

/// [`emit`], abandoned once the request has been cancelled for longer than
/// `grace`.
async fn emit_within<S>(sink: &mut S, bytes: &[u8], cancel: &CancelToken, grace: Duration) -> bool
where
    S: OutputSink + ?Sized,
{
    let give_up = async {
        cancel.cancelled().await;
        tokio::time::sleep(grace).await;
    };
    tokio::select! {
        delivered = emit(sink, bytes) => delivered,
        _ = give_up => {
            debug!(target: "crudd.exec", "client not reading; dropping trailing output");
            false
        }
    }
}

/// Write and flush; `false` when the client is gone.
async fn emit<S>(sink: &mut S, bytes: &[u8]) -> bool
where
    S: OutputSink + ?Sized,
{
    if bytes.is_empty() {
        return true;
    }
    let result = match sink.write(bytes).await {
        Ok(()) => sink.flush().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(target: "crudd.exec", error = %e, "dropped write to closed response");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(RunPhase::Starting < RunPhase::Streaming);
        assert!(RunPhase::Streaming < RunPhase::AwaitingExit);
        assert!(RunPhase::AwaitingExit < RunPhase::Done);
    }
}
