//! Decoding of streamed message responses
//!
//! The body of `POST /conversations/{id}/messages` is UTF-8 text made of JSON
//! objects separated by `\r\n`. Network chunks do not line up with fragment
//! boundaries, so bytes are buffered until a full fragment is available.

use crate::error::ApiError;
use crate::state::StreamFragment;

const DELIMITER: &[u8] = b"\r\n";

/// Incremental CRLF-delimited JSON decoder
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: Vec<u8>,
    /// Bytes before this offset are known to hold no delimiter
    scanned: usize,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of the body
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete fragment, or `None` until more bytes arrive.
    ///
    /// Empty and whitespace-only segments are skipped. Bytes after the last
    /// delimiter stay buffered.
    pub fn next_fragment(&mut self) -> Result<Option<StreamFragment>, ApiError> {
        loop {
            let Some(pos) = find_delimiter(&self.buffer[self.scanned..]).map(|p| p + self.scanned)
            else {
                // Keep a possible CR at the end so a CRLF split across chunks is found
                self.scanned = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
                return Ok(None);
            };
            let segment: Vec<u8> = self.buffer.drain(..pos + DELIMITER.len()).collect();
            self.scanned = 0;
            if let Some(fragment) = decode_segment(&segment[..pos])? {
                return Ok(Some(fragment));
            }
        }
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Result<Option<StreamFragment>, ApiError> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        decode_segment(&rest)
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

fn decode_segment(segment: &[u8]) -> Result<Option<StreamFragment>, ApiError> {
    let text = String::from_utf8_lossy(segment);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let fragment = serde_json::from_str::<StreamFragment>(trimmed)?;
    Ok(Some(fragment))
}
