//! Response writer (C3).
//!
//! Grounded on `original_source/.../response_writer.py`. One deliberate
//! deviation from that source: the original writes the JSON line and the
//! `"\n\n"` separator as two separate `write()` calls. `SPEC_FULL.md` §5
//! requires the writer's output to be atomic per record when the underlying
//! transport is shared across workers, so this implementation always emits
//! `<json>\n\n` as a single `write()` call under one lock acquisition (see
//! `DESIGN.md`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::io_server::model::{OutboundEvent, SessionMessage, StreamOutputMessage};

/// Sink for a single, complete outbound record (`<json>\n\n`).
///
/// Implementations must make `write` safe for concurrent use when the
/// underlying transport is shared across worker tasks (stdio, TCP).
#[async_trait]
pub trait RecordSink: Send + Sync + std::fmt::Debug {
    async fn write_record(&self, record: String) -> Result<()>;
}

/// The four primitives exposed to handlers and the IO server: `log`,
/// `error`, `heartbeat`, `session_message`.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    sink: Arc<dyn RecordSink>,
}

impl ResponseWriter {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self { sink }
    }

    async fn put(
        &self,
        event: OutboundEvent,
        session_id: Option<String>,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        let message = StreamOutputMessage {
            event,
            session_id,
            data,
        };
        let mut record = serde_json::to_string(&message)?;
        record.push_str("\n\n");
        self.sink.write_record(record).await
    }

    /// Write the manifest envelope -- the first outbound record on a
    /// persistent transport, so the host can verify the plugin's identity
    /// before normal dispatch begins.
    pub async fn manifest(&self, manifest: serde_json::Value) -> Result<()> {
        let mut record = crate::io_server::model::manifest_envelope(manifest).to_string();
        record.push_str("\n\n");
        self.sink.write_record(record).await
    }

    pub async fn log(&self, message: impl Serialize) -> Result<()> {
        self.put(OutboundEvent::Log, None, Some(serde_json::to_value(message)?))
            .await
    }

    pub async fn error(&self, session_id: Option<String>, data: serde_json::Value) -> Result<()> {
        self.put(OutboundEvent::Error, session_id, Some(data)).await
    }

    pub async fn heartbeat(&self) -> Result<()> {
        self.put(OutboundEvent::Heartbeat, None, Some(serde_json::json!({})))
            .await
    }

    pub async fn session_message(
        &self,
        session_id: impl Into<String>,
        inner: SessionMessage,
    ) -> Result<()> {
        self.put(
            OutboundEvent::Session,
            Some(session_id.into()),
            Some(serde_json::to_value(inner)?),
        )
        .await
    }
}
