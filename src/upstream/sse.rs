//! Upstream SSE decoding.
//!
//! Reassembles `data:` lines across TCP chunk boundaries and turns each
//! line into at most one text fragment. Parsing is isolated per line: a
//! payload that fails to decode is logged and skipped, never propagated.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::types::ChatCompletionChunk;
use super::FragmentStream;
use crate::error::Error;

/// End-of-stream marker sent by the upstream.
const DONE_SENTINEL: &str = "[DONE]";

/// Buffers raw bytes and yields complete lines with their terminator stripped.
///
/// Lines are only decoded once complete, so multi-byte UTF-8 sequences split
/// across chunks are reassembled before conversion.
pub(crate) struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a chunk and drain every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        for i in scan_from..self.buffer.len() {
            if self.buffer[i] == b'\n' {
                lines.extend(decode_line(&self.buffer[start..i]));
                start = i + 1;
            }
        }
        self.buffer.drain(..start);
        lines
    }

    /// Take whatever is left after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

/// Strip the terminator and decode. Lines that are not valid UTF-8 are dropped.
fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(line) => Some(line.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, len = raw.len(), "Skipping stream line that is not valid UTF-8");
            None
        }
    }
}

/// What a single SSE line contributes to the fragment sequence.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Skip,
    Fragment(String),
    Done,
}

/// Classify one complete SSE line.
pub(crate) fn parse_line(line: &str) -> LineOutcome {
    let Some(data) = line.strip_prefix("data:") else {
        // event:, id:, retry:, comments and blank separators
        return LineOutcome::Skip;
    };

    let data = data.trim();
    if data.is_empty() {
        return LineOutcome::Skip;
    }
    if data == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .into_fragment()
            .map_or(LineOutcome::Skip, LineOutcome::Fragment),
        Err(e) => {
            tracing::warn!(error = %e, payload = %data, "Skipping malformed stream chunk");
            LineOutcome::Skip
        }
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseLineDecoder,
    pending: VecDeque<String>,
    finished: bool,
    done_received: bool,
    fragments: usize,
}

impl<S> DecodeState<S> {
    /// Feed lines into the pending queue, stopping at `[DONE]`.
    fn absorb(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            match parse_line(&line) {
                LineOutcome::Skip => {}
                LineOutcome::Fragment(text) => self.pending.push_back(text),
                LineOutcome::Done => {
                    self.done_received = true;
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// Turn an upstream SSE body into a lazy sequence of text fragments.
///
/// The sequence ends at `[DONE]` or when the body is exhausted. A body read
/// error is yielded once and ends the sequence. Dropping the returned stream
/// drops `body`, which releases the upstream connection.
pub fn fragment_stream<S, E>(body: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        done_received: false,
        fragments: 0,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                state.fragments += 1;
                return Some((Ok(text), state));
            }
            if state.finished {
                tracing::debug!(
                    fragments = state.fragments,
                    done_received = state.done_received,
                    "Upstream stream finished"
                );
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let lines = state.decoder.push(&bytes);
                    state.absorb(lines);
                }
                Some(Err(e)) => {
                    let err: Error = e.into();
                    tracing::error!(error = %err, "Error reading upstream stream");
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.decoder.finish();
                    state.absorb(rest);
                }
            }
        }
    })
    .boxed()
}
