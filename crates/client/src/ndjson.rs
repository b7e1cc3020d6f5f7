//! Incremental newline-delimited JSON framing.
//!
//! Response bodies arrive in arbitrary chunks; a chunk may end mid-line or even
//! mid-codepoint. [`NdjsonDecoder`] buffers bytes and only emits complete lines.

use serde_json::Value as JsonValue;

use genesisdb_core::{ClientError, ClientResult};
use genesisdb_events::Event;

/// Splits a byte stream into complete, trimmed, non-empty lines.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> ClientResult<Vec<String>> {
        let mut lines = Vec::new();
        let mut scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buf[scan_from..].iter().position(|b| *b == b'\n') {
            let end = scan_from + offset;
            if let Some(line) = to_line(&self.buf[start..end])? {
                lines.push(line);
            }
            start = end + 1;
            scan_from = start;
        }
        self.buf.drain(..start);
        Ok(lines)
    }

    /// Flush the trailing line of a finished body (bodies need not end in `\n`).
    pub fn finish(self) -> ClientResult<Option<String>> {
        to_line(&self.buf)
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn to_line(bytes: &[u8]) -> ClientResult<Option<String>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ClientError::protocol(format!("response line is not UTF-8: {e}")))?;
    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Decode a complete body into its lines.
pub fn split_lines(body: &[u8]) -> ClientResult<Vec<String>> {
    let mut decoder = NdjsonDecoder::new();
    let mut lines = decoder.push(body)?;
    lines.extend(decoder.finish()?);
    Ok(lines)
}

/// One framed line of an event read.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(Box<Event>),
    /// Keep-alive traffic with no event (`{"payload":""}` or an SSE comment).
    Heartbeat,
}

/// Parse one line of a `/stream` or `/observe` body.
///
/// Lines may carry an SSE `data:` prefix.
pub fn parse_frame(line: &str) -> ClientResult<Frame> {
    if line.starts_with(':') {
        return Ok(Frame::Heartbeat);
    }
    let json = line
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line);

    let value: JsonValue = serde_json::from_str(json)
        .map_err(|e| ClientError::protocol(format!("invalid event JSON: {e}")))?;

    if is_heartbeat(&value) {
        return Ok(Frame::Heartbeat);
    }
    Event::from_value(value).map(|e| Frame::Event(Box::new(e)))
}

fn is_heartbeat(value: &JsonValue) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get("payload").and_then(JsonValue::as_str) == Some(""))
}
