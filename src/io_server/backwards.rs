//! Backwards-invocation client (C8).
//!
//! Grounded on `original_source/.../requests/__init__.py`. A plugin-issued
//! call to the host (model, tool, storage, ...) is correlated by a UUID
//! `backwards_request_id` and answered over the same inbound stream the
//! fan-out reader already decodes -- no separate connection. Each polling
//! round waits up to one second; after 250 consecutive empty rounds
//! (~250s with no reply) the call times out, matching `SPEC_FULL.md` §4.8.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use crate::config::InstallMethod;
use crate::error::{PluginRuntimeError, Result};
use crate::io_server::model::{
    BackwardsInvocationEventKind, BackwardsInvocationResponseEvent, Envelope, InboundEvent, InvokeType,
    SessionMessage,
};
use crate::io_server::reader::{FilterReaderGuard, RequestReader, TimedRead};
use crate::io_server::writer::ResponseWriter;

const ROUND_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_EMPTY_ROUNDS: u32 = 250;
const DAEMON_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Which transport strategy carries this invocation's replies -- full-duplex
/// (stdio/TCP, sharing the inbound fan-out) or a dedicated HTTP request/
/// streaming-response pair (serverless install), per `SPEC_FULL.md` §4.8.
enum Strategy {
    FullDuplex { guard: FilterReaderGuard },
    Http { lines: HttpLineStream },
}

/// Buffers a chunked HTTP response body into `\n`-delimited records.
struct HttpLineStream {
    response: reqwest::Response,
    buffer: String,
}

impl HttpLineStream {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.find('\n') {
                let line = self.buffer[..pos].to_string();
                self.buffer.drain(..=pos);
                return Ok(Some(line));
            }
            match self.response.chunk().await? {
                Some(bytes) => self.buffer.push_str(&String::from_utf8_lossy(&bytes)),
                None => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let line = std::mem::take(&mut self.buffer);
                    return Ok(Some(line));
                }
            }
        }
    }
}

/// One outcome of polling a backwards invocation for its next event.
#[derive(Debug, Clone)]
pub enum BackwardsInvocationOutcome {
    /// A data chunk from the host; more may follow.
    Response(serde_json::Value),
    /// The host reported a handler-side error; terminal.
    Error { message: Option<String>, data: Option<serde_json::Value> },
    /// The host signaled completion; terminal.
    End,
}

/// Issues one backwards invocation and polls for its replies. Both
/// transport strategies share this one decode/timeout path
/// (`SPEC_FULL.md` §4.8: "Both paths share the decoder wrapper").
pub struct BackwardsInvocationClient {
    reader: Arc<RequestReader>,
    writer: ResponseWriter,
    session_id: String,
    backwards_request_id: String,
    install_method: InstallMethod,
    daemon_base_url: Option<String>,
    strategy: tokio::sync::Mutex<Option<Strategy>>,
    empty_rounds: std::sync::atomic::AtomicU32,
}

impl BackwardsInvocationClient {
    pub fn new(reader: Arc<RequestReader>, writer: ResponseWriter, session_id: String) -> Self {
        Self::with_install_method(reader, writer, session_id, InstallMethod::Local, None)
    }

    pub fn with_install_method(
        reader: Arc<RequestReader>,
        writer: ResponseWriter,
        session_id: String,
        install_method: InstallMethod,
        daemon_base_url: Option<String>,
    ) -> Self {
        Self {
            reader,
            writer,
            session_id,
            backwards_request_id: Uuid::new_v4().simple().to_string(),
            install_method,
            daemon_base_url,
            strategy: tokio::sync::Mutex::new(None),
            empty_rounds: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn backwards_request_id(&self) -> &str {
        &self.backwards_request_id
    }

    /// Send the invocation request, selecting the strategy by install
    /// method. Full-duplex subscribes before writing the request so a fast
    /// host reply can never race ahead of the subscription; HTTP issues the
    /// POST and keeps the streaming response open.
    pub async fn invoke(&self, invoke_type: InvokeType, data: serde_json::Value) -> Result<()> {
        match self.install_method {
            InstallMethod::AwsLambda => self.invoke_http(invoke_type, data).await,
            InstallMethod::Local | InstallMethod::Remote => self.invoke_full_duplex(invoke_type, data).await,
        }
    }

    async fn invoke_full_duplex(&self, invoke_type: InvokeType, data: serde_json::Value) -> Result<()> {
        let backwards_request_id = self.backwards_request_id.clone();
        let guard = self
            .reader
            .read(move |envelope: &Envelope| {
                envelope.event == InboundEvent::BackwardsResponse
                    && envelope
                        .data
                        .get("backwards_request_id")
                        .and_then(|v| v.as_str())
                        == Some(backwards_request_id.as_str())
            })
            .await;
        *self.strategy.lock().await = Some(Strategy::FullDuplex { guard });

        self.writer
            .session_message(
                self.session_id.clone(),
                SessionMessage::Invoke {
                    data: serde_json::json!({
                        "type": invoke_type,
                        "backwards_request_id": self.backwards_request_id,
                        "data": data,
                    }),
                },
            )
            .await
    }

    async fn invoke_http(&self, invoke_type: InvokeType, data: serde_json::Value) -> Result<()> {
        let base_url = self
            .daemon_base_url
            .as_deref()
            .ok_or_else(|| PluginRuntimeError::Config("daemon.base_url is required for the aws_lambda install method".to_string()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(DAEMON_HTTP_TIMEOUT)
            .timeout(DAEMON_HTTP_TIMEOUT)
            .build()?;

        let payload = serde_json::json!({
            "type": invoke_type,
            "backwards_request_id": self.backwards_request_id,
            "data": data,
        });

        let response = client
            .post(format!("{base_url}/backwards-invocation/transaction"))
            .header("Dify-Plugin-Session-ID", self.session_id.clone())
            .json(&payload)
            .send()
            .await?;

        *self.strategy.lock().await = Some(Strategy::Http {
            lines: HttpLineStream {
                response,
                buffer: String::new(),
            },
        });
        Ok(())
    }

    /// Poll for the next reply, blocking up to [`ROUND_TIMEOUT`] per round
    /// and giving up after [`MAX_EMPTY_ROUNDS`] consecutive empty rounds.
    pub async fn next(&self) -> Result<BackwardsInvocationOutcome> {
        let mut strategy_slot = self.strategy.lock().await;
        let strategy = strategy_slot
            .as_mut()
            .ok_or_else(|| PluginRuntimeError::BackwardsInvocation("invoke() was never called".to_string()))?;

        match strategy {
            Strategy::FullDuplex { guard } => self.next_full_duplex(guard).await,
            Strategy::Http { lines } => self.next_http(lines).await,
        }
    }

    async fn next_full_duplex(&self, guard: &FilterReaderGuard) -> Result<BackwardsInvocationOutcome> {
        loop {
            match guard.read_timed(ROUND_TIMEOUT).await {
                TimedRead::Envelope(envelope) => {
                    self.empty_rounds.store(0, std::sync::atomic::Ordering::SeqCst);
                    return self.decode_event(envelope.data);
                }
                TimedRead::Closed => {
                    return Err(PluginRuntimeError::BackwardsInvocation(
                        "reply stream closed before an end event".to_string(),
                    )
                    .into());
                }
                TimedRead::Timeout => {
                    self.bump_empty_rounds()?;
                }
            }
        }
    }

    async fn next_http(&self, lines: &mut HttpLineStream) -> Result<BackwardsInvocationOutcome> {
        loop {
            match tokio::time::timeout(ROUND_TIMEOUT, lines.next_line()).await {
                Ok(Ok(Some(line))) if !line.trim().is_empty() => {
                    self.empty_rounds.store(0, std::sync::atomic::Ordering::SeqCst);
                    let data: serde_json::Value = serde_json::from_str(line.trim())?;
                    return self.decode_event(data);
                }
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) => {
                    return Err(PluginRuntimeError::BackwardsInvocation(
                        "daemon closed the backwards-invocation response before an end event".to_string(),
                    )
                    .into());
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => self.bump_empty_rounds()?,
            }
        }
    }

    fn bump_empty_rounds(&self) -> Result<()> {
        let rounds = self.empty_rounds.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if rounds >= MAX_EMPTY_ROUNDS {
            return Err(PluginRuntimeError::BackwardsTimeout {
                backwards_request_id: self.backwards_request_id.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn decode_event(&self, data: serde_json::Value) -> Result<BackwardsInvocationOutcome> {
        let event: BackwardsInvocationResponseEvent = serde_json::from_value(data)?;
        Ok(match event.event {
            BackwardsInvocationEventKind::Response => {
                BackwardsInvocationOutcome::Response(event.data.unwrap_or(serde_json::Value::Null))
            }
            BackwardsInvocationEventKind::Error => BackwardsInvocationOutcome::Error {
                message: event.message,
                data: event.data,
            },
            BackwardsInvocationEventKind::End => BackwardsInvocationOutcome::End,
        })
    }
}
