//! Stdio transport: the process's own stdin/stdout.
//!
//! Unlike the teacher's `StdioTransport`, which spawns a *child* process and
//! talks to it over pipes, this transport reads and writes the current
//! process's own standard streams -- the plugin runtime here plays the role
//! of the child the host spawned (`SPEC_FULL.md` §5, install method
//! `local`).

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::io_server::transport::LineSource;
use crate::io_server::writer::RecordSink;

pub struct StdioReader {
    lines: BufReader<Stdin>,
}

impl StdioReader {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for StdioReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineSource for StdioReader {
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        let n = self.lines.read_line(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Writes each record to stdout under a single lock, so concurrent workers
/// never interleave partial records.
#[derive(Debug)]
pub struct StdioTransport {
    stdout: Mutex<Stdout>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSink for StdioTransport {
    async fn write_record(&self, record: String) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(record.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}
