//! HTTP transport: embedded server for the `aws_lambda` / serverless install
//! method.
//!
//! Direction-inverted from the teacher's `reqwest`-based MCP HTTP client
//! (`src/mcp/transport/http.rs` in the teacher): there, the teacher's process
//! calls *out* to an MCP server over HTTP. Here the plugin runtime itself
//! *is* the server the daemon calls into -- `POST /invoke` accepts one
//! newline-delimited request body and streams back `<json>\n\n` records
//! exactly as stdio/TCP would, `GET /health` answers worker-pool liveness
//! (`SPEC_FULL.md` §5).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;

/// One `POST /invoke` body is handed to the server; the returned stream's
/// items are already-framed `<json>\n\n` records.
#[async_trait]
pub trait HttpInvocationHandler: Send + Sync {
    async fn handle_invocation(&self, body: String) -> mpsc::Receiver<String>;
    fn available_workers(&self) -> usize;
}

#[derive(Clone)]
struct HttpState {
    handler: Arc<dyn HttpInvocationHandler>,
}

pub struct HttpTransport {
    addr: SocketAddr,
    handler: Arc<dyn HttpInvocationHandler>,
}

impl HttpTransport {
    pub fn new(addr: SocketAddr, handler: Arc<dyn HttpInvocationHandler>) -> Self {
        Self { addr, handler }
    }

    pub fn router(&self) -> Router {
        build_router(HttpState {
            handler: Arc::clone(&self.handler),
        })
    }

    /// Run the embedded server until the process is asked to shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "http transport listening");
        axum::serve(listener, router)
            .await
            .map_err(|e| crate::error::PluginRuntimeError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/invoke", post(invoke_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn invoke_handler(State(state): State<HttpState>, body: String) -> impl IntoResponse {
    let rx = state.handler.handle_invocation(body).await;
    let stream: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, Infallible>> + Send>> =
        Box::pin(ReceiverStream::new(rx).map(|record| Ok(Bytes::from(record))));
    Body::from_stream(stream)
}

async fn health_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let workers = state.handler.available_workers();
    (
        [("x-available-workers", workers.to_string())],
        "OK",
    )
}
