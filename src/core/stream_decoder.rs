//! Incremental decoder for `text/event-stream` completion bodies.
//!
//! Network chunks never line up with lines, code points, or even CRLF pairs,
//! so the decoder keeps three pieces of carry-over state: undecoded UTF-8
//! bytes, the partial trailing line, and whether the last chunk ended in a
//! carriage return.

use std::collections::VecDeque;
use std::fmt;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use memchr::memchr2;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::backend::error::BackendError;

/// Data payload that ends a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Line some servers emit in place of an event when they fail mid-stream.
pub const ERROR_SENTINEL_LINE: &str = ": error";

/// A data payload that could not be parsed as JSON.
#[derive(Debug)]
pub struct DecodeError {
    pub payload: String,
    pub source: serde_json::Error,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid JSON in event stream: {}", self.source)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut index = 0;
        while index < self.pending.len() {
            match std::str::from_utf8(&self.pending[index..]) {
                Ok(text) => {
                    out.push_str(text);
                    index = self.pending.len();
                }
                Err(err) => {
                    let valid = index + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[index..valid]));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            index = valid + bad;
                        }
                        // incomplete sequence at the end; wait for more bytes
                        None => {
                            index = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..index);
        out
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Result of feeding bytes to the decoder.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    /// Events completed by this input, in order.
    pub events: Vec<Value>,
    /// The terminating sentinel was seen; later input is ignored.
    pub done: bool,
    /// A payload failed to parse. Events before it are still in `events`;
    /// the decoder accepts no further input.
    pub error: Option<DecodeError>,
}

/// Synchronous core of the event-stream decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Carry,
    line: String,
    ended_with_cr: bool,
    event_type: Option<String>,
    data: Option<String>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> DecodedBatch {
        let decoded = self.utf8.decode(chunk);
        self.push_text(&decoded)
    }

    /// Flushes whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> DecodedBatch {
        let mut text = self.utf8.finish();
        if !self.line.is_empty() || !text.is_empty() {
            text.push('\n');
        }
        self.push_text(&text)
    }

    fn push_text(&mut self, text: &str) -> DecodedBatch {
        let mut batch = DecodedBatch {
            done: self.done,
            ..DecodedBatch::default()
        };
        if self.done || text.is_empty() {
            return batch;
        }

        let mut rest = text;
        if self.ended_with_cr {
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }
        self.ended_with_cr = rest.ends_with('\r');

        while let Some(pos) = memchr2(b'\n', b'\r', rest.as_bytes()) {
            let (head, tail) = rest.split_at(pos);
            let mut complete = std::mem::take(&mut self.line);
            complete.push_str(head);
            let skip = if tail.starts_with("\r\n") { 2 } else { 1 };
            rest = &tail[skip..];

            match self.process_line(&complete) {
                Ok(LineOutcome::Continue) => {}
                Ok(LineOutcome::Event(value)) => batch.events.push(value),
                Ok(LineOutcome::Done) => {
                    self.done = true;
                    batch.done = true;
                    return batch;
                }
                Err(err) => {
                    self.done = true;
                    batch.error = Some(err);
                    return batch;
                }
            }
        }
        self.line.push_str(rest);

        batch
    }

    fn process_line(&mut self, line: &str) -> Result<LineOutcome, DecodeError> {
        if line.is_empty() || line == ERROR_SENTINEL_LINE {
            self.event_type = None;
            self.data = None;
            return Ok(LineOutcome::Continue);
        }
        if line.starts_with(':') {
            return Ok(LineOutcome::Continue);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            _ => {}
        }

        let is_message = self
            .event_type
            .as_deref()
            .is_none_or(|kind| kind == "message");
        if !is_message {
            return Ok(LineOutcome::Continue);
        }
        let Some(data) = self.data.take() else {
            return Ok(LineOutcome::Continue);
        };
        self.event_type = None;

        if data == DONE_SENTINEL {
            return Ok(LineOutcome::Done);
        }

        match serde_json::from_str::<Value>(&data) {
            Ok(value) => Ok(LineOutcome::Event(value)),
            Err(source) => Err(DecodeError {
                payload: data,
                source,
            }),
        }
    }
}

enum LineOutcome {
    Continue,
    Event(Value),
    Done,
}

struct DecodeState<S> {
    body: Option<S>,
    decoder: SseDecoder,
    queue: VecDeque<Value>,
    failure: Option<BackendError>,
    cancel: CancellationToken,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn release_body(&mut self) {
        if self.body.take().is_some() {
            debug!("Released completion body stream");
        }
    }
}

/// Decodes a byte stream into JSON events.
///
/// The returned stream ends after the `[DONE]` sentinel or when the body
/// ends. A cancelled token surfaces as [`BackendError::Cancelled`] before the
/// next item, and a malformed payload ends the stream with
/// [`BackendError::Decode`] after the events that preceded it.
///
/// Dropping the returned stream early drops `body`, which closes the
/// connection. Pass `&mut body` instead to keep the body alive for another
/// reader; it is then left untouched.
pub fn decode_event_stream<'a, S, B, E>(
    body: S,
    cancel: CancellationToken,
) -> BoxStream<'a, Result<Value, BackendError>>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'a,
    B: AsRef<[u8]> + Send + 'a,
    E: Into<BackendError> + Send + 'a,
{
    let state = DecodeState {
        body: Some(body),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        failure: None,
        cancel,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.cancel.is_cancelled() {
                if state.finished && state.queue.is_empty() && state.failure.is_none() {
                    return None;
                }
                state.finished = true;
                state.queue.clear();
                state.failure = None;
                state.release_body();
                return Some((Err(BackendError::Cancelled), state));
            }

            if let Some(event) = state.queue.pop_front() {
                return Some((Ok(event), state));
            }
            if let Some(failure) = state.failure.take() {
                return Some((Err(failure), state));
            }
            if state.finished {
                return None;
            }

            let next = {
                let Some(body) = state.body.as_mut() else {
                    state.finished = true;
                    continue;
                };
                tokio::select! {
                    item = body.next() => item,
                    _ = state.cancel.cancelled() => continue,
                }
            };

            let batch = match next {
                Some(Ok(bytes)) => state.decoder.push(bytes.as_ref()),
                Some(Err(err)) => {
                    state.finished = true;
                    state.release_body();
                    return Some((Err(err.into()), state));
                }
                None => {
                    state.finished = true;
                    state.release_body();
                    state.decoder.finish()
                }
            };

            state.queue.extend(batch.events);
            if let Some(err) = batch.error {
                state.failure = Some(BackendError::from(err));
            }
            if batch.done || state.failure.is_some() {
                state.finished = true;
                state.release_body();
            }
        }
    })
    .boxed()
}
