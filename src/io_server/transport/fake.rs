//! In-memory transport for tests.
//!
//! Grounded on the teacher's `src/mcp/transport/fake.rs`: a canned line
//! source paired with a recording sink, so IO server tests can drive a full
//! request/response cycle without touching real stdio, sockets, or an HTTP
//! listener.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::io_server::transport::LineSource;
use crate::io_server::writer::RecordSink;

/// Replays a fixed list of lines, then returns `None` forever (clean EOF).
pub struct FakeTransport {
    lines: Mutex<std::vec::IntoIter<String>>,
}

impl FakeTransport {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: Mutex::new(lines.into_iter()),
        }
    }
}

#[async_trait]
impl LineSource for FakeTransport {
    async fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.get_mut().unwrap().next())
    }
}

/// Records every record written to it, in order, for assertion in tests.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    records: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for RecordingTransport {
    async fn write_record(&self, record: String) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}
