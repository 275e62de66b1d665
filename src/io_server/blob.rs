//! Blob-chunk streamer (C12).
//!
//! Grounded on `entities/tool.py`'s field validators in `original_source/`,
//! which settle the ambiguity `SPEC_FULL.md` §9 flags: blob fragments are
//! base64-encoded, not hex (hex is reserved for the unrelated C13
//! HTTP-over-bytes path). Each fragment carries a strictly increasing
//! `sequence`, a shared `id` so interleaved blobs can be grouped back
//! together, and the original `total_length` so a consumer can tell a
//! fragment belongs to the blob it expects; a final empty fragment marks
//! `end: true`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CHUNK_SIZE: usize = 8 * 1024;

/// One fragment of a chunked blob transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobChunk {
    pub id: String,
    pub sequence: u64,
    pub total_length: u64,
    pub data: String,
    pub end: bool,
}

/// Split `bytes` into base64-encoded, 8 KiB-sourced fragments sharing one
/// correlation `id` and the original `total_length`. Always yields at least
/// the terminal empty fragment, even for empty input.
pub fn chunk(bytes: &[u8]) -> Vec<BlobChunk> {
    let id = Uuid::new_v4().simple().to_string();
    let total_length = bytes.len() as u64;

    let mut chunks: Vec<BlobChunk> = bytes
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(sequence, slice)| BlobChunk {
            id: id.clone(),
            sequence: sequence as u64,
            total_length,
            data: BASE64.encode(slice),
            end: false,
        })
        .collect();

    let terminal_sequence = chunks.len() as u64;
    chunks.push(BlobChunk {
        id,
        sequence: terminal_sequence,
        total_length,
        data: String::new(),
        end: true,
    });
    chunks
}

/// Reassemble fragments produced by [`chunk`] (or received over the wire)
/// back into the original bytes. Fragments must arrive in `sequence` order
/// and share one `id`; out-of-order or mixed-id input is an error rather
/// than silently reordered or merged, since the wire never reorders or
/// interleaves records within one blob transfer once grouped by `id`.
pub fn reassemble(fragments: &[BlobChunk]) -> crate::error::Result<Vec<u8>> {
    let mut out = Vec::new();
    let id = fragments.first().map(|f| f.id.as_str());
    for (expected, fragment) in fragments.iter().enumerate() {
        if Some(fragment.id.as_str()) != id {
            return Err(crate::error::PluginRuntimeError::Validation {
                message: format!("blob fragment id mismatch: expected {:?}, got {}", id, fragment.id),
            }
            .into());
        }
        if fragment.sequence != expected as u64 {
            return Err(crate::error::PluginRuntimeError::Validation {
                message: format!(
                    "blob fragment out of order: expected sequence {expected}, got {}",
                    fragment.sequence
                ),
            }
            .into());
        }
        if fragment.end {
            break;
        }
        out.extend(BASE64.decode(&fragment.data).map_err(|e| {
            crate::error::PluginRuntimeError::Decode(format!("invalid base64 blob fragment: {e}"))
        })?);
    }
    Ok(out)
}
