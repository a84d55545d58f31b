// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line framing over a raw output pipe.

use futures::stream::{self, StreamExt};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use crate::launch::OutputStream;

/// Longest line emitted in one piece; longer runs are split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Turn a pipe into a stream of lossily-decoded lines.
///
/// Lines are delimited by `\n`; a trailing `\r` is dropped and a final
/// unterminated line is still yielded. The stream ends after the first
/// read error.
pub(crate) fn line_stream<R>(reader: R) -> OutputStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let state = Some((BufReader::new(reader), Vec::new()));
    stream::unfold(state, |state| async move {
        let (mut reader, mut carry) = state?;
        match next_line(&mut reader, &mut carry, MAX_LINE_BYTES).await {
            Ok(Some(line)) => Some((Ok(decode(line)), Some((reader, carry)))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Read one line of at most `max` bytes.
///
/// A split never cuts a UTF-8 sequence: its leading bytes are moved into
/// `carry` and start the next line.
async fn next_line<R>(reader: &mut R, carry: &mut Vec<u8>, max: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = std::mem::take(carry);
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok((!line.is_empty()).then_some(line));
        }
        let window = &available[..available.len().min(max - line.len())];
        if let Some(pos) = window.iter().position(|b| *b == b'\n') {
            line.extend_from_slice(&window[..pos]);
            reader.consume(pos + 1);
            return Ok(Some(line));
        }
        let taken = window.len();
        line.extend_from_slice(window);
        reader.consume(taken);
        if line.len() >= max {
            *carry = line.split_off(char_boundary(&line));
            return Ok(Some(line));
        }
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
fn char_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back && back < len { len - back } else { len };
    }
    len
}

fn decode(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    match String::from_utf8(line) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
