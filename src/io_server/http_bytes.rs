//! HTTP-over-bytes helpers (C13).
//!
//! Some endpoint invocations carry an entire raw HTTP request as a hex
//! string rather than a structured envelope (`SPEC_FULL.md` §4.13), distinct
//! from the base64 blob-chunk path (C12). Decodes the hex, parses it with
//! `httparse`, and re-encodes response chunks back to hex frames.

use serde::{Deserialize, Serialize};

use crate::error::{PluginRuntimeError, Result};

/// A parsed raw HTTP request, decoded from a hex-encoded wire payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHttpRequest {
    pub method: String,
    pub path: String,
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Decode a hex string into an HTTP request, parsing just the start-line and
/// headers with `httparse` and treating everything after the header
/// terminator as the body.
pub fn decode_request(hex_payload: &str) -> Result<RawHttpRequest> {
    let raw =
        hex::decode(hex_payload).map_err(|e| PluginRuntimeError::Decode(format!("invalid hex payload: {e}")))?;

    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);
    let status = req
        .parse(&raw)
        .map_err(|e| PluginRuntimeError::Decode(format!("invalid http request: {e}")))?;

    let body_offset = match status {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => {
            return Err(PluginRuntimeError::Decode("incomplete http request".to_string()).into());
        }
    };

    Ok(RawHttpRequest {
        method: req.method.unwrap_or("GET").to_string(),
        path: req.path.unwrap_or("/").to_string(),
        version: req.version.unwrap_or(1),
        headers: req
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect(),
        body: raw[body_offset..].to_vec(),
    })
}

/// A raw HTTP response, split into a status/headers frame and one or more
/// hex-encoded body-chunk frames rather than one combined byte stream
/// (`SPEC_FULL.md` §4.13, scenario S4): the host needs the status line
/// before it has seen the whole body, and a large body still has to move
/// through the same line-delimited JSON channel as everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Build the first outbound frame for an endpoint response: `{"status":
/// ..., "headers": {...}}`, sent once, ahead of any body-chunk frame.
pub fn encode_status_frame(status: u16, headers: &[(String, String)]) -> serde_json::Value {
    let headers: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
        .collect();
    serde_json::json!({ "status": status, "headers": headers })
}

/// Hex-encode a response body into fragments the status frame's reader
/// dispatches one at a time. Always yields at least one chunk, even for an
/// empty body, so an empty response still gets a body frame.
pub fn encode_body_chunks(body: &[u8]) -> Vec<String> {
    if body.is_empty() {
        return vec![hex::encode(body)];
    }
    body.chunks(crate::io_server::blob::CHUNK_SIZE)
        .map(hex::encode)
        .collect()
}
