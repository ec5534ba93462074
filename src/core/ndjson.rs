//! Incremental decoder for newline-delimited JSON bodies.
//!
//! Bytes arrive in arbitrary chunks. Complete lines are decoded as soon as
//! their terminating `\n` shows up; the unterminated tail waits in the buffer
//! for the next chunk. Lines are split on raw bytes so a multi-byte UTF-8
//! sequence cut by a chunk boundary is reassembled before decoding.

use memchr::memchr;
use serde::de::DeserializeOwned;
use std::fmt;

/// A line that could not be decoded as a record.
#[derive(Debug)]
pub struct MalformedRecord {
    /// 1-based position of the line in the body, counting blank lines.
    pub line_number: usize,
    /// The offending line, lossily decoded.
    pub line: String,
    pub reason: MalformedReason,
}

#[derive(Debug)]
pub enum MalformedReason {
    Utf8(std::str::Utf8Error),
    Json(serde_json::Error),
}

impl MalformedRecord {
    /// Leading part of the line, for log output.
    pub fn preview(&self) -> &str {
        const MAX_PREVIEW: usize = 120;
        if self.line.len() <= MAX_PREVIEW {
            return &self.line;
        }
        let mut end = MAX_PREVIEW;
        while !self.line.is_char_boundary(end) {
            end -= 1;
        }
        &self.line[..end]
    }
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            MalformedReason::Utf8(err) => {
                write!(f, "line {} is not valid UTF-8: {err}", self.line_number)
            }
            MalformedReason::Json(err) => {
                write!(f, "line {} is not valid JSON: {err}", self.line_number)
            }
        }
    }
}

impl std::error::Error for MalformedRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.reason {
            MalformedReason::Utf8(err) => Some(err),
            MalformedReason::Json(err) => Some(err),
        }
    }
}

/// Hook for recovered decode failures.
///
/// The transport skips malformed lines and keeps going; observers let callers
/// count or inspect what was skipped.
pub trait RecordObserver {
    fn on_malformed(&mut self, record: MalformedRecord);
}

/// Observer that discards malformed records.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreMalformed;

impl RecordObserver for IgnoreMalformed {
    fn on_malformed(&mut self, _record: MalformedRecord) {}
}

impl RecordObserver for Vec<MalformedRecord> {
    fn on_malformed(&mut self, record: MalformedRecord) {
        self.push(record);
    }
}

pub type Decoded<T> = Result<T, MalformedRecord>;

#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    lines_seen: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and decode every line it completes, in order.
    ///
    /// Whitespace-only lines are skipped without producing an entry.
    pub fn push<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Vec<Decoded<T>> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset;
            self.lines_seen += 1;
            if let Some(line) = decode_line(&self.buffer[start..end], self.lines_seen) {
                decoded.push(line);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        decoded
    }

    /// Decode whatever is left once the body has ended.
    ///
    /// A final record without a trailing newline is still a record.
    pub fn finish<T: DeserializeOwned>(&mut self) -> Option<Decoded<T>> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.lines_seen += 1;
        decode_line(&rest, self.lines_seen)
    }

    /// Number of buffered bytes still waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line<T: DeserializeOwned>(raw: &[u8], line_number: usize) -> Option<Decoded<T>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(err) => {
            return Some(Err(MalformedRecord {
                line_number,
                line: String::from_utf8_lossy(raw).into_owned(),
                reason: MalformedReason::Utf8(err),
            }))
        }
    };

    // Also strips the `\r` of CRLF-terminated lines.
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(
        serde_json::from_str(text).map_err(|err| MalformedRecord {
            line_number,
            line: text.to_string(),
            reason: MalformedReason::Json(err),
        }),
    )
}
