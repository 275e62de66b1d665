//! Session (C7).
//!
//! Grounded on `original_source/.../session.py`. The Python original keeps a
//! process-wide `_session_pool: ClassVar[set[Session]]` purely so a
//! long-running daemon can enumerate live sessions for diagnostics; nothing
//! in `SPEC_FULL.md` requires that registry, and instance-scoped state composes
//! more simply with Rust's ownership model, so it is deliberately dropped
//! here (`DESIGN.md`, Deviations).

use std::sync::Arc;

use crate::config::InstallMethod;
use crate::io_server::backwards::BackwardsInvocationClient;
use crate::io_server::model::{InvokeType, SessionMessage};
use crate::io_server::pool::WorkerPool;
use crate::io_server::reader::RequestReader;
use crate::io_server::writer::ResponseWriter;

/// Identifying context carried alongside a session id: which conversation,
/// message, app, or endpoint this request belongs to. All optional, mirrors
/// the optional fields on [`crate::io_server::model::Envelope`].
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub app_id: Option<String>,
    pub endpoint_id: Option<String>,
    pub message_id: Option<String>,
}

/// One in-flight request's handle to the rest of the IO server: a bound
/// writer for emitting `session` events, a reader + pool for issuing
/// backwards invocations, and enough context to address them correctly.
#[derive(Clone)]
pub struct Session {
    session_id: String,
    reader: Arc<RequestReader>,
    writer: ResponseWriter,
    pool: Arc<WorkerPool>,
    install_method: InstallMethod,
    daemon_base_url: Option<String>,
    conversation_id: Option<String>,
    context: SessionContext,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        reader: Arc<RequestReader>,
        writer: ResponseWriter,
        pool: Arc<WorkerPool>,
        install_method: InstallMethod,
        conversation_id: Option<String>,
        context: SessionContext,
    ) -> Self {
        Self::with_daemon_base_url(session_id, reader, writer, pool, install_method, None, conversation_id, context)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_daemon_base_url(
        session_id: String,
        reader: Arc<RequestReader>,
        writer: ResponseWriter,
        pool: Arc<WorkerPool>,
        install_method: InstallMethod,
        daemon_base_url: Option<String>,
        conversation_id: Option<String>,
        context: SessionContext,
    ) -> Self {
        Self {
            session_id,
            reader,
            writer,
            pool,
            install_method,
            daemon_base_url,
            conversation_id,
            context,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn install_method(&self) -> InstallMethod {
        self.install_method
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Stream one chunk of tool/llm/etc. output back to the host.
    pub async fn stream(&self, data: serde_json::Value) -> crate::error::Result<()> {
        self.writer
            .session_message(self.session_id.clone(), SessionMessage::Stream { data })
            .await
    }

    /// Terminate this session's response stream.
    pub async fn end(&self) -> crate::error::Result<()> {
        self.writer
            .session_message(self.session_id.clone(), SessionMessage::End)
            .await
    }

    /// Report a handler-level error and implicitly terminate the stream.
    pub async fn error(&self, error_type: impl Into<String>, message: impl Into<String>) -> crate::error::Result<()> {
        self.writer
            .session_message(
                self.session_id.clone(),
                SessionMessage::Error {
                    data: serde_json::json!({
                        "error_type": error_type.into(),
                        "message": message.into(),
                    }),
                },
            )
            .await?;
        self.end().await
    }

    fn backwards_client(&self) -> BackwardsInvocationClient {
        BackwardsInvocationClient::with_install_method(
            Arc::clone(&self.reader),
            self.writer.clone(),
            self.session_id.clone(),
            self.install_method,
            self.daemon_base_url.clone(),
        )
    }

    /// Backwards-invoke the host's model runtime (LLM, embedding, rerank,
    /// TTS, speech-to-text, moderation -- `kind` picks the sub-type).
    pub async fn model(&self, kind: InvokeType, data: serde_json::Value) -> crate::error::Result<BackwardsInvocationClient> {
        let client = self.backwards_client();
        client.invoke(kind, data).await?;
        Ok(client)
    }

    pub async fn tool(&self, data: serde_json::Value) -> crate::error::Result<BackwardsInvocationClient> {
        let client = self.backwards_client();
        client.invoke(InvokeType::Tool, data).await?;
        Ok(client)
    }

    pub async fn app(&self, data: serde_json::Value) -> crate::error::Result<BackwardsInvocationClient> {
        let client = self.backwards_client();
        client.invoke(InvokeType::App, data).await?;
        Ok(client)
    }

    pub async fn workflow_node(&self, data: serde_json::Value) -> crate::error::Result<BackwardsInvocationClient> {
        let client = self.backwards_client();
        client.invoke(InvokeType::WorkflowNode, data).await?;
        Ok(client)
    }

    pub async fn storage(&self, data: serde_json::Value) -> crate::error::Result<BackwardsInvocationClient> {
        let client = self.backwards_client();
        client.invoke(InvokeType::Storage, data).await?;
        Ok(client)
    }

    pub async fn file(&self, data: serde_json::Value) -> crate::error::Result<BackwardsInvocationClient> {
        let client = self.backwards_client();
        client.invoke(InvokeType::File, data).await?;
        Ok(client)
    }
}
