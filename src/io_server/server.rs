//! IO server (C10): composes the reader, writer, pool, router, and the
//! process-lifecycle loops (heartbeat, orphan check) into one request loop
//! over an arbitrary [`LineSource`].
//!
//! Grounded on `original_source/.../server.py`. One deliberate
//! simplification: the original enforces `max_request_timeout` with a
//! `PeekableQueue`-backed GC sweep polling a priority queue of deadlines on a
//! fixed interval. Tokio gives every spawned task its own cancellable
//! deadline directly (`tokio::time::timeout` wrapping the dispatch future),
//! which enforces the identical per-request timeout invariant without a
//! separate sweeping task or the head-of-queue peek dance -- see
//! `DESIGN.md`, Deviations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{Config, InstallMethod};
use crate::io_server::codec::{decode_line, DecodedLine};
use crate::io_server::model::{Envelope, InboundEvent};
use crate::io_server::pool::WorkerPool;
use crate::io_server::reader::RequestReader;
use crate::io_server::router::Router;
use crate::io_server::session::{Session, SessionContext};
use crate::io_server::transport::http::HttpInvocationHandler;
use crate::io_server::transport::LineSource;
use crate::io_server::writer::{RecordSink, ResponseWriter};

pub struct IoServer {
    reader: Arc<RequestReader>,
    writer: ResponseWriter,
    pool: Arc<WorkerPool>,
    router: Arc<Router>,
    config: Arc<Config>,
    shutting_down: Arc<AtomicBool>,
}

impl IoServer {
    pub fn new(writer: ResponseWriter, router: Router, config: Arc<Config>) -> Self {
        Self {
            reader: Arc::new(RequestReader::new()),
            writer,
            pool: Arc::new(WorkerPool::new(config.server.max_worker)),
            router: Arc::new(router),
            config,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reader(&self) -> &Arc<RequestReader> {
        &self.reader
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Run the decode-dispatch loop until `source` reaches end-of-stream or
    /// the server is asked to shut down. Spawns the heartbeat and (on unix)
    /// orphan-check loops alongside it.
    pub async fn run(&self, mut source: impl LineSource + 'static) -> crate::error::Result<()> {
        let heartbeat = self.spawn_heartbeat_loop();
        #[cfg(unix)]
        let orphan_check = self.spawn_orphan_check_loop();

        while !self.shutting_down.load(Ordering::SeqCst) {
            match source.read_line().await? {
                None => break,
                Some(line) => self.handle_line(&line).await,
            }
        }

        heartbeat.abort();
        #[cfg(unix)]
        orphan_check.abort();
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    async fn handle_line(&self, line: &str) {
        match decode_line(line) {
            None => {}
            Some(DecodedLine::Invalid(raw)) => {
                self.reader.report_decode_error(&self.writer, None, &raw).await;
            }
            Some(DecodedLine::Valid(envelope)) => {
                self.reader.process_envelope(envelope.clone(), &self.writer).await;
                if envelope.event == InboundEvent::Request {
                    self.dispatch_request(envelope).await;
                }
            }
        }
    }

    async fn dispatch_request(&self, envelope: Envelope) {
        let router = Arc::clone(&self.router);
        let reader = Arc::clone(&self.reader);
        let writer = self.writer.clone();
        let install_method = self.config.install.method;
        let daemon_base_url = Some(self.config.daemon.base_url.clone());
        let timeout = Duration::from_secs(self.config.server.max_request_timeout_secs);

        self.pool.spawn(run_dispatch(
            router,
            reader,
            writer,
            Arc::clone(&self.pool),
            install_method,
            daemon_base_url,
            timeout,
            envelope,
        ));
    }

    fn spawn_heartbeat_loop(&self) -> tokio::task::JoinHandle<()> {
        let writer = self.writer.clone();
        let interval = Duration::from_secs(self.config.server.heartbeat_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if writer.heartbeat().await.is_err() {
                    tracing::warn!("failed to write heartbeat");
                }
            }
        })
    }

    #[cfg(unix)]
    fn spawn_orphan_check_loop(&self) -> tokio::task::JoinHandle<()> {
        let shutting_down = Arc::clone(&self.shutting_down);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            loop {
                ticker.tick().await;
                // Reparented to init (pid 1) means the process that spawned
                // this plugin runtime has exited without telling us.
                if unsafe { libc::getppid() } == 1 {
                    tracing::warn!("parent process gone, shutting down");
                    shutting_down.store(true, Ordering::SeqCst);
                    break;
                }
            }
        })
    }
}

/// Discards everything written to it.
#[derive(Debug)]
struct NullSink;

#[async_trait]
impl RecordSink for NullSink {
    async fn write_record(&self, _record: String) -> crate::error::Result<()> {
        Ok(())
    }
}

impl IoServer {
    /// Build an [`IoServer`] for the `aws_lambda` install method, where the
    /// server's own persistent writer is never consulted -- every invocation
    /// gets its own channel-backed [`ResponseWriter`] via
    /// [`HttpInvocationHandler::handle_invocation`] below.
    pub fn new_serverless(router: Router, config: Arc<Config>) -> Self {
        Self::new(ResponseWriter::new(Arc::new(NullSink) as Arc<dyn RecordSink>), router, config)
    }
}

/// Dispatches one decoded request envelope: builds its [`Session`], runs it
/// through the router under the configured request timeout, and emits
/// `DispatchError`/`RequestTimeout` on the caller-supplied `writer` when
/// dispatch doesn't finish cleanly. Shared by the persistent-transport path
/// ([`IoServer::dispatch_request`]) and the one-shot HTTP path below, so both
/// enforce the identical timeout/error contract.
#[allow(clippy::too_many_arguments)]
async fn run_dispatch(
    router: Arc<Router>,
    reader: Arc<RequestReader>,
    writer: ResponseWriter,
    pool: Arc<WorkerPool>,
    install_method: InstallMethod,
    daemon_base_url: Option<String>,
    timeout: Duration,
    envelope: Envelope,
) {
    let session = Session::with_daemon_base_url(
        envelope.session_id.clone(),
        reader,
        writer.clone(),
        pool,
        install_method,
        daemon_base_url,
        envelope.conversation_id.clone(),
        SessionContext {
            app_id: envelope.app_id.clone(),
            endpoint_id: envelope.endpoint_id.clone(),
            message_id: envelope.message_id.clone(),
        },
    );

    let session_id = envelope.session_id.clone();
    let dispatched = tokio::time::timeout(timeout, router.dispatch(&session, envelope.data)).await;
    match dispatched {
        Ok(true) => {}
        Ok(false) => {
            let _ = writer
                .error(
                    Some(session_id),
                    serde_json::json!({"error_type": "DispatchError", "message": "no route matched"}),
                )
                .await;
        }
        Err(_) => {
            let _ = writer
                .error(
                    Some(session_id),
                    serde_json::json!({"error_type": "RequestTimeout", "message": "request exceeded max_request_timeout"}),
                )
                .await;
        }
    }
}

/// Bridges one `write_record` call to an mpsc sender, so a single HTTP
/// invocation's records can be framed exactly like stdio/TCP's but streamed
/// out through an axum response body instead of a shared persistent sink.
#[derive(Debug)]
struct ChannelSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn write_record(&self, record: String) -> crate::error::Result<()> {
        let _ = self.tx.send(record).await;
        Ok(())
    }
}

/// Lets an [`IoServer`] serve the `aws_lambda` install method: each `POST
/// /invoke` body is one envelope, decoded and dispatched exactly like a
/// stdio/TCP line, but against a fresh channel-backed writer scoped to that
/// one request/response instead of the server's persistent transport.
#[async_trait]
impl HttpInvocationHandler for IoServer {
    async fn handle_invocation(&self, body: String) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        let writer = ResponseWriter::new(Arc::new(ChannelSink { tx }) as Arc<dyn RecordSink>);
        let reader = Arc::clone(&self.reader);
        let router = Arc::clone(&self.router);
        let pool = Arc::clone(&self.pool);
        let install_method = self.config.install.method;
        let daemon_base_url = Some(self.config.daemon.base_url.clone());
        let timeout = Duration::from_secs(self.config.server.max_request_timeout_secs);

        tokio::spawn(async move {
            match decode_line(&body) {
                None => {}
                Some(DecodedLine::Invalid(raw)) => {
                    reader.report_decode_error(&writer, None, &raw).await;
                }
                Some(DecodedLine::Valid(envelope)) => {
                    reader.process_envelope(envelope.clone(), &writer).await;
                    if envelope.event == InboundEvent::Request {
                        let handle = pool.spawn(run_dispatch(
                            router,
                            reader.clone(),
                            writer.clone(),
                            Arc::clone(&pool),
                            install_method,
                            daemon_base_url,
                            timeout,
                            envelope,
                        ));
                        let _ = handle.await;
                    }
                }
            }
        });

        rx
    }

    fn available_workers(&self) -> usize {
        self.pool.available_permits()
    }
}
