// SPDX-License-Identifier: MIT OR Apache-2.0
//! Draining command output into a sink, one flushed line at a time.

use futures::StreamExt;
use tracing::{debug, error, info};

use crate::cancel::CancelToken;
use crate::error::ExecError;
use crate::escape::escape_html;
use crate::launch::OutputStream;
use crate::sink::OutputSink;

/// Why relaying stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The output stream reached its end.
    Exhausted,
    /// Reading the output failed; the error was logged.
    ReadError,
    /// The sink rejected a write because the client went away.
    SinkClosed,
    /// The request was cancelled.
    Cancelled,
}

/// Result of a [`relay`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Lines delivered to the sink.
    pub lines: usize,
    /// Why relaying stopped.
    pub end: RelayEnd,
}

/// Copy `output` into `sink`, HTML-escaping each line and flushing after it.
///
/// Stops at end of stream, on the first read error, when the sink fails, or
/// when `cancel` fires. A failing sink means the client is gone, so it also
/// cancels the request.
pub async fn relay<S>(
    output: &mut OutputStream,
    sink: &mut S,
    cancel: &CancelToken,
    verbose: bool,
) -> RelayOutcome
where
    S: OutputSink + ?Sized,
{
    let mut lines = 0usize;
    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break RelayEnd::Cancelled,
            next = output.next() => next,
        };
        let line = match next {
            None => break RelayEnd::Exhausted,
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                error!(target: "crudd.exec", error = %ExecError::Read(e), "relay stopped");
                break RelayEnd::ReadError;
            }
        };

        let mut escaped = escape_html(&line).into_owned();
        escaped.push('\n');
        // A client that stops reading must not outlive cancellation.
        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => break RelayEnd::Cancelled,
            delivered = deliver(sink, escaped.as_bytes()) => delivered,
        };
        if let Err(e) = delivered {
            debug!(target: "crudd.exec", error = %e, "client stopped accepting output");
            cancel.cancel();
            break RelayEnd::SinkClosed;
        }

        lines += 1;
        if verbose {
            info!(target: "crudd.exec", bytes = line.len(), line = %line, "streamed line to client");
        }
    };
    RelayOutcome { lines, end }
}

async fn deliver<S>(sink: &mut S, bytes: &[u8]) -> std::io::Result<()>
where
    S: OutputSink + ?Sized,
{
    sink.write(bytes).await?;
    sink.flush().await
}
