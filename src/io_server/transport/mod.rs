//! Transport layer (C2): stdio, TCP, and embedded HTTP.
//!
//! Grounded on `original_source/.../io_reader.py` and `io_writer.py` for the
//! stdio/TCP shapes, and `SPEC_FULL.md` §5 for the HTTP transport, which is
//! direction-inverted from the teacher's `reqwest`-based MCP HTTP client: here
//! the plugin runtime is itself the embedded `axum` server the daemon calls
//! into (AWS Lambda / serverless install method).

pub mod fake;
pub mod http;
pub mod stdio;
pub mod tcp;

use async_trait::async_trait;

use crate::error::Result;

/// Produces decoded-or-raw lines of input, one record at a time, regardless
/// of which concrete transport backs it.
#[async_trait]
pub trait LineSource: Send {
    /// Returns the next `\n`-terminated record's contents (without the
    /// newline), or `None` on clean end-of-stream.
    async fn read_line(&mut self) -> Result<Option<String>>;
}

pub use fake::FakeTransport;
pub use http::HttpTransport;
pub use stdio::StdioTransport;
pub use tcp::TcpTransport;
