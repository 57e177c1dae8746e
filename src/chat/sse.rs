//! Incremental decoding of the chat backend's SSE body.
//!
//! Bytes arrive in arbitrary chunks. [`Utf8StreamDecoder`] turns them into text
//! without splitting multi-byte characters, [`LineBuffer`] holds the trailing
//! partial line between reads, and [`parse_line`] maps each complete line onto a
//! [`StreamFrame`].

use serde_json::Value;
use tracing::debug;

use crate::chat::types::{StreamFrame, StructuredFrame};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Byte-to-text decoder that carries incomplete UTF-8 sequences across chunks.
///
/// Invalid sequences decode to U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        // Truncated sequence at the end; wait for more bytes.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is still pending once the stream has ended.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Accumulates decoded text and hands back complete lines in arrival order.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and drain every complete line. The last, possibly
    /// incomplete, segment stays buffered.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline_pos);
            lines.push(line);
        }
        lines
    }

    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

/// Map one complete line to a frame. Returns `None` for lines that carry
/// nothing: non-`data:` lines, the `[DONE]` sentinel and empty payloads.
pub fn parse_line(line: &str) -> Option<StreamFrame> {
    let payload = line.strip_prefix(DATA_PREFIX)?;

    if payload == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            let frame = StructuredFrame::from_value(&value);
            if frame == StructuredFrame::default() {
                debug!("Frame carries no known fields: {}", payload);
            }
            Some(StreamFrame::Structured(frame))
        }
        Err(_) if payload.trim().is_empty() => None,
        Err(_) => Some(StreamFrame::Text(payload.to_string())),
    }
}
