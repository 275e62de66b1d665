//! Framed line codec (C1).
//!
//! One JSON envelope per `\n`-terminated record. Empty lines between frames
//! are silently consumed. A line that fails to parse as JSON is surfaced as
//! [`DecodedLine::Invalid`] carrying the raw text rather than killing the
//! stream -- decode errors are reported through the writer, not by
//! terminating the reader (`SPEC_FULL.md` §4.1, §7).

use crate::io_server::model::Envelope;

/// The result of decoding one line of input.
#[derive(Debug, Clone)]
pub enum DecodedLine {
    /// Successfully parsed envelope.
    Valid(Envelope),
    /// A non-empty line that failed to parse as an envelope; the raw text
    /// is retained so a decode-error event can reference it.
    Invalid(String),
}

/// Decode a single line of input. Returns `None` for a blank line (silently
/// consumed, per spec), `Some(Valid(..))` on success, `Some(Invalid(..))`
/// on a parse failure.
pub fn decode_line(line: &str) -> Option<DecodedLine> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Envelope>(trimmed) {
        Ok(envelope) => Some(DecodedLine::Valid(envelope)),
        Err(_) => Some(DecodedLine::Invalid(trimmed.to_string())),
    }
}

/// Encode an envelope as a `\n`-terminated JSON record.
pub fn encode_line(envelope: &Envelope) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(envelope)?;
    line.push('\n');
    Ok(line)
}
