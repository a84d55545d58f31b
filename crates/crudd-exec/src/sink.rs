// SPDX-License-Identifier: MIT OR Apache-2.0
//! Destinations for streamed command output.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use tokio::sync::mpsc;

/// A buffered, flushable byte destination, typically an HTTP response body.
///
/// `write` may buffer; only `flush` guarantees the bytes reach the client.
/// Both fail with [`io::ErrorKind::BrokenPipe`] once the client is gone.
#[async_trait]
pub trait OutputSink: Send {
    /// Append bytes.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push everything written so far to the client.
    async fn flush(&mut self) -> io::Result<()>;
}

fn client_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

/// Sink backed by a bounded channel feeding a streaming response body.
///
/// Every flush becomes one body chunk. Dropping the receiving end (the
/// client went away) makes further writes fail.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
    buf: Vec<u8>,
}

impl ChannelSink {
    /// Create a sink and the chunk receiver for the response body.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                buf: Vec::new(),
            },
            rx,
        )
    }

    /// Resolves once the body receiver has been dropped.
    pub fn disconnected(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }

    /// Returns `true` if the body receiver has been dropped.
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.tx.is_closed() {
            return Err(client_gone());
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return if self.tx.is_closed() {
                Err(client_gone())
            } else {
                Ok(())
            };
        }
        let chunk = std::mem::take(&mut self.buf);
        self.tx.send(chunk).await.map_err(|_| client_gone())
    }
}

/// In-memory sink recording each flushed chunk.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    chunks: Vec<Vec<u8>>,
    pending: Vec<u8>,
    fail_after_flushes: Option<usize>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that behaves like a client disconnecting after `n` flushes.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after_flushes: Some(n),
            ..Self::default()
        }
    }

    /// Flushed chunks in order.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Everything flushed so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.chunks.concat()).into_owned()
    }

    fn closed(&self) -> bool {
        self.fail_after_flushes
            .is_some_and(|limit| self.chunks.len() >= limit)
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed() {
            return Err(client_gone());
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.closed() {
            return Err(client_gone());
        }
        if !self.pending.is_empty() {
            self.chunks.push(std::mem::take(&mut self.pending));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_sends_one_chunk_per_flush() {
        let (mut sink, mut rx) = ChannelSink::new(4);
        sink.write(b"a").await.unwrap();
        sink.write(b"b").await.unwrap();
        sink.flush().await.unwrap();
        sink.flush().await.unwrap();
        sink.write(b"c").await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        assert_eq!(rx.recv().await.unwrap(), b"ab");
        assert_eq!(rx.recv().await.unwrap(), b"c");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn channel_sink_reports_disconnect() {
        let (mut sink, rx) = ChannelSink::new(1);
        let gone = sink.disconnected();
        drop(rx);
        gone.await;
        assert!(sink.is_disconnected());
        let err = sink.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(sink.flush().await.is_err());
    }

    #[tokio::test]
    async fn memory_sink_fails_after_limit() {
        let mut sink = MemorySink::failing_after(1);
        sink.write(b"one").await.unwrap();
        sink.flush().await.unwrap();
        assert!(sink.write(b"two").await.is_err());
        assert_eq!(sink.contents(), "one");
    }

    #[tokio::test]
    async fn memory_sink_only_exposes_flushed_bytes() {
        let mut sink = MemorySink::new();
        sink.write(b"held").await.unwrap();
        assert!(sink.contents().is_empty());
        sink.flush().await.unwrap();
        assert_eq!(sink.chunks().len(), 1);
    }
}
