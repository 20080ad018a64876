//! Server-sent event decoding.
//!
//! [`SseDecoder`] is the push-style line framer: feed it whatever bytes a
//! network read produced and it returns the messages those bytes completed.
//! [`MessageStream`] drives a decoder from an async byte stream.
//!
//! # Framing
//!
//! Bytes are buffered until a `\n` arrives; the trailing partial line is held
//! back for the next read. Buffering happens before UTF-8 decoding, so a
//! multi-byte character split across reads is reassembled intact.
//!
//! Only `data:` lines carry payloads. Blank separators, comments, and other
//! SSE fields are ignored. A payload that is not valid JSON is logged and
//! skipped; the stream carries on.
//!
//! Decoding stops after the first terminal item (`complete`, `error`, or an
//! unknown status). Anything the server sends after that is dropped.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};

use crate::error::GenerationError;
use crate::models::{StreamMessage, WireMessage};

/// Outcome of decoding one item: a message, or a fatal protocol error.
pub type Decoded = Result<StreamMessage, GenerationError>;

/// Incremental SSE line decoder. One instance per generation attempt.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
    skipped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read. Returns the items completed by it, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }

        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut rest = &buf[..];
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];
            self.decode_line(line, &mut out);
            if self.done {
                return out;
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Signal end of input. A residual unterminated line is decoded once,
    /// since end-of-stream terminates it.
    pub fn finish(&mut self) -> Vec<Decoded> {
        let mut out = Vec::new();
        if !self.done {
            let line = std::mem::take(&mut self.pending);
            self.decode_line(&line, &mut out);
            self.done = true;
        }
        out
    }

    /// True once a terminal item was produced or input ended.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of `data:` payloads dropped because they were not valid JSON.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8], out: &mut Vec<Decoded>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let text = String::from_utf8_lossy(line);
        let payload = match text.strip_prefix("data:") {
            Some(p) => p.trim(),
            None => return,
        };
        if payload.is_empty() {
            return;
        }

        let wire: WireMessage = match serde_json::from_str(payload) {
            Ok(w) => w,
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, data = payload, "skipping malformed SSE payload");
                return;
            }
        };

        let decoded = StreamMessage::from_wire(wire);
        if decoded.as_ref().map_or(true, StreamMessage::is_terminal) {
            self.done = true;
        }
        out.push(decoded);
    }
}

/// Pull-style message source over an async byte stream.
///
/// Owns the body stream; dropping a `MessageStream` releases the underlying
/// reader no matter how consumption ended.
pub struct MessageStream<S> {
    body: S,
    decoder: SseDecoder,
    queued: VecDeque<Decoded>,
    exhausted: bool,
}

impl<S, B, E> MessageStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<GenerationError>,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            decoder: SseDecoder::new(),
            queued: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next decoded item, or `None` once the stream is finished.
    ///
    /// A read failure is returned as a fatal error and ends the stream.
    pub async fn next_message(&mut self) -> Option<Decoded> {
        loop {
            if let Some(item) = self.queued.pop_front() {
                return Some(item);
            }
            if self.exhausted || self.decoder.is_done() {
                return None;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => {
                    let items = self.decoder.feed(bytes.as_ref());
                    self.queued.extend(items);
                }
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.exhausted = true;
                    let items = self.decoder.finish();
                    self.queued.extend(items);
                }
            }
        }
    }

    /// Malformed payloads skipped so far.
    pub fn skipped(&self) -> usize {
        self.decoder.skipped()
    }

    /// Adapt into a [`Stream`] of decoded items.
    pub fn into_stream(self) -> impl Stream<Item = Decoded> {
        futures::stream::unfold(self, |mut ms| async move {
            ms.next_message().await.map(|item| (item, ms))
        })
    }
}
