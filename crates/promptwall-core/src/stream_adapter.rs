//! Stream adapter system
//!
//! Parses the streaming wire format of a generation backend into text
//! fragments. Backends deliver arbitrary byte chunks, so [`EventBuffer`]
//! reassembles complete SSE events before they reach an adapter.

use std::fmt::Debug;

/// A parsed piece of a generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedChunk {
    /// Text fragment to forward
    Content(String),

    /// Stream completion signal
    Done {
        /// Reason for completion (stop, length, content_filter, ...)
        finish_reason: Option<String>,
    },

    /// Event with nothing to forward (role preamble, keep-alive)
    Empty,

    /// Event that could not be parsed
    Error(String),
}

impl ParsedChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    pub fn done(finish_reason: Option<String>) -> Self {
        Self::Done { finish_reason }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            _ => None,
        }
    }
}

/// Trait for parsing a backend streaming format
pub trait StreamAdapter: Send + Sync + Debug {
    /// Name of this adapter (for logging)
    fn name(&self) -> &str;

    /// Parse one complete event (may contain several `data:` lines)
    fn parse(&self, event: &str) -> Vec<ParsedChunk>;
}

/// Reassembles SSE events from arbitrarily split byte chunks
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: Vec<u8>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and drain every complete event (terminated by a blank line).
    /// Bytes are held until an event completes so split UTF-8 sequences survive.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((idx, len)) = event_boundary(&self.pending) {
            let raw: Vec<u8> = self.pending.drain(..idx + len).collect();
            if let Some(event) = decode_event(&raw[..idx]) {
                events.push(event);
            }
        }
        events
    }

    /// Whatever is left once the stream ends
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_event(&rest)
    }
}

/// Position and length of the first blank-line separator
fn event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn decode_event(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw).replace("\r\n", "\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
