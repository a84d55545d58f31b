// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subprocess spawning and the per-process exit supervisor.

use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::ExecError;
use crate::lines::line_stream;

/// Exit code reported when the command could not be started at all.
///
/// Matches the shell's "command not found" status.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code reported when the command was terminated by a signal or could
/// not be reaped.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Default time a command gets to exit once its output is drained or the
/// request is cancelled.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Merged stdout/stderr of a command, one line per item.
pub type OutputStream = BoxStream<'static, io::Result<String>>;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Resolved executable path.
    pub program: PathBuf,
    /// Argument list.
    pub args: Vec<String>,
    /// Bound on the post-drain / post-cancel exit wait.
    pub grace_period: Duration,
}

impl LaunchSpec {
    /// Create a spec with no arguments and the default grace period.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Replace the argument list.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the grace period.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    fn display_program(&self) -> String {
        self.program.display().to_string()
    }
}

/// A launched command, owned by exactly one request.
///
/// Produces exactly one exit code through [`wait_exit`](Self::wait_exit),
/// which consumes the handle.
pub struct RunningProcess {
    /// Merged output lines.
    pub output: OutputStream,
    pid: Option<u32>,
    drained: Option<oneshot::Sender<()>>,
    exit: oneshot::Receiver<i32>,
    launch_error: Option<String>,
}

impl std::fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningProcess")
            .field("pid", &self.pid)
            .field("drained", &self.drained.is_none())
            .field("launch_error", &self.launch_error)
            .finish_non_exhaustive()
    }
}

impl RunningProcess {
    /// OS process id, if the command started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The launch failure message, if the command never started.
    pub fn launch_error(&self) -> Option<&str> {
        self.launch_error.as_deref()
    }

    /// Tell the supervisor that the output has been drained.
    ///
    /// Idempotent.
    pub fn mark_drained(&mut self) {
        if let Some(tx) = self.drained.take() {
            let _ = tx.send(());
        }
    }

    /// Release the output pipes and wait for the exit code.
    ///
    /// Implies [`mark_drained`](Self::mark_drained). Returns once the
    /// supervisor has reaped the process, which is bounded by the grace
    /// period after drain or cancellation.
    pub async fn wait_exit(mut self) -> i32 {
        self.mark_drained();
        drop(self.output);
        match self.exit.await {
            Ok(code) => code,
            Err(_) => {
                warn!(target: "crudd.exec", pid = ?self.pid, "exit supervisor vanished");
                SIGNAL_EXIT_CODE
            }
        }
    }

    fn failed(err: ExecError) -> Self {
        let msg = err.to_string();
        warn!(target: "crudd.exec", error = %msg, "command launch failed");
        let (exit_tx, exit_rx) = oneshot::channel();
        let _ = exit_tx.send(LAUNCH_FAILURE_EXIT_CODE);
        Self {
            output: stream::iter([Ok(msg.clone())]).boxed(),
            pid: None,
            drained: None,
            exit: exit_rx,
            launch_error: Some(msg),
        }
    }
}

/// Start `spec` with stdout and stderr captured and merged.
///
/// Never fails: a command that cannot be started yields a single
/// descriptive output line and [`LAUNCH_FAILURE_EXIT_CODE`]. Cancelling
/// `cancel` force-kills the command; the process is always reaped.
pub fn launch(spec: &LaunchSpec, cancel: CancelToken) -> RunningProcess {
    let (child, stdout, stderr) = match spawn(spec) {
        Ok(parts) => parts,
        Err(err) => return RunningProcess::failed(err),
    };
    let pid = child.id();
    info!(
        target: "crudd.exec",
        pid = ?pid,
        program = %spec.program.display(),
        args = ?spec.args,
        "executing command"
    );

    let (drained_tx, drained_rx) = oneshot::channel();
    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(supervise(
        child,
        drained_rx,
        cancel,
        spec.grace_period,
        exit_tx,
    ));

    let output = stream::select(line_stream(stdout), line_stream(stderr)).boxed();
    RunningProcess {
        output,
        pid,
        drained: Some(drained_tx),
        exit: exit_rx,
        launch_error: None,
    }
}

fn spawn(spec: &LaunchSpec) -> Result<(Child, ChildStdout, ChildStderr), ExecError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: spec.display_program(),
        source,
    })?;

    match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => Ok((child, stdout, stderr)),
        (stdout, _) => {
            // kill_on_drop plus the runtime's orphan reaper collect the child.
            terminate(&mut child);
            Err(ExecError::Pipe {
                stream: if stdout.is_none() { "stdout" } else { "stderr" },
                program: spec.display_program(),
            })
        }
    }
}

/// Waits for drain or cancellation, then always reaps the child.
async fn supervise(
    mut child: Child,
    drained: oneshot::Receiver<()>,
    cancel: CancelToken,
    grace: Duration,
    exit_tx: oneshot::Sender<i32>,
) {
    let pid = child.id();
    tokio::select! {
        // A dropped sender counts as drained.
        _ = drained => {}
        _ = cancel.cancelled() => {
            info!(target: "crudd.exec", pid = ?pid, "request cancelled early");
            terminate(&mut child);
        }
    }

    let code = match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => exit_code(result),
        Err(_) => {
            warn!(
                target: "crudd.exec",
                pid = ?pid,
                grace_ms = grace.as_millis() as u64,
                "command still running after grace period"
            );
            terminate(&mut child);
            exit_code(child.wait().await)
        }
    };
    debug!(target: "crudd.exec", pid = ?pid, code, "command reaped");
    let _ = exit_tx.send(code);
}

/// Best-effort SIGKILL; a child that already exited is not an error.
fn terminate(child: &mut Child) {
    match child.start_kill() {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            debug!(target: "crudd.exec", "kill skipped: process already exited");
        }
        Err(e) => warn!(target: "crudd.exec", error = %e, "failed to kill command"),
    }
}

fn exit_code(result: io::Result<ExitStatus>) -> i32 {
    match result {
        Ok(status) => status.code().unwrap_or(SIGNAL_EXIT_CODE),
        Err(e) => {
            warn!(target: "crudd.exec", error = %ExecError::Wait(e), "could not reap command");
            SIGNAL_EXIT_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builder_sets_fields() {
        let spec = LaunchSpec::new("/bin/echo")
            .args(["a", "b"])
            .grace_period(Duration::from_secs(1));
        assert_eq!(spec.program, PathBuf::from("/bin/echo"));
        assert_eq!(spec.args, ["a", "b"]);
        assert_eq!(spec.grace_period, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn missing_binary_yields_synthetic_result() {
        let spec = LaunchSpec::new("/no/such/binary-crudd");
        let mut process = launch(&spec, CancelToken::new());
        assert!(process.pid().is_none());
        let msg = process.launch_error().unwrap().to_owned();
        assert!(msg.contains("failed to run /no/such/binary-crudd"), "{msg}");

        let lines: Vec<String> = (&mut process.output).map(|r| r.unwrap()).collect().await;
        assert_eq!(lines, [msg]);
        assert_eq!(process.wait_exit().await, LAUNCH_FAILURE_EXIT_CODE);
    }
}
