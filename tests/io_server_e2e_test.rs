//! End-to-end IO server (C10) tests: a full decode -> fan-out -> dispatch ->
//! response cycle over the in-memory fake transport, covering the session
//! scenarios from the wire contract -- successful dispatch, decode errors,
//! unroutable requests, and heartbeats -- without touching real stdio, TCP,
//! or HTTP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use plugin_runtime::config::Config;
use plugin_runtime::executor::{Action, Executor};
use plugin_runtime::io_server::model::SessionMessage;
use plugin_runtime::io_server::router::{Handler, Router};
use plugin_runtime::io_server::session::Session;
use plugin_runtime::io_server::transport::fake::{FakeTransport, RecordingTransport};
use plugin_runtime::io_server::transport::LineSource;
use plugin_runtime::io_server::writer::{RecordSink, ResponseWriter};
use plugin_runtime::io_server::IoServer;
use plugin_runtime::registry::{Registry, ToolProvider};

/// Never yields a line; stands in for an idle persistent transport so the
/// heartbeat loop can be observed running on its own interval.
struct IdleSource;

#[async_trait]
impl LineSource for IdleSource {
    async fn read_line(&mut self) -> plugin_runtime::Result<Option<String>> {
        std::future::pending().await
    }
}

#[derive(Debug, Deserialize)]
struct EchoInput {
    text: String,
}

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    type Input = EchoInput;

    async fn handle(&self, session: &Session, input: Self::Input) {
        let _ = session
            .writer()
            .session_message(
                session.session_id().to_string(),
                SessionMessage::Stream {
                    data: serde_json::json!({"echo": input.text}),
                },
            )
            .await;
        let _ = session
            .writer()
            .session_message(session.session_id().to_string(), SessionMessage::End)
            .await;
    }
}

fn fast_heartbeat_config() -> Arc<Config> {
    let mut config = Config::default();
    config.server.heartbeat_interval_secs = 1;
    Arc::new(config)
}

#[tokio::test]
async fn a_routed_request_streams_its_result_then_ends() {
    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink.clone() as Arc<dyn RecordSink>);
    let mut router = Router::new();
    router.register(
        |data| data.get("action") == Some(&serde_json::json!("echo")),
        EchoHandler,
    );
    let server = IoServer::new(writer, router, fast_heartbeat_config());

    let line = serde_json::json!({
        "session_id": "s1",
        "event": "request",
        "data": {"action": "echo", "text": "ping"},
    })
    .to_string();
    let source = FakeTransport::new(vec![line]);
    server.run(source).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let records = sink.records();
    assert!(records.iter().any(|r| r.contains("\"echo\":\"ping\"")));
    assert!(records.iter().any(|r| r.contains("\"type\":\"end\"")));
}

#[tokio::test]
async fn multiple_sessions_in_one_stream_are_each_dispatched_independently() {
    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink.clone() as Arc<dyn RecordSink>);
    let mut router = Router::new();
    router.register(
        |data| data.get("action") == Some(&serde_json::json!("echo")),
        EchoHandler,
    );
    let server = IoServer::new(writer, router, fast_heartbeat_config());

    let lines = vec![
        serde_json::json!({"session_id": "s1", "event": "request", "data": {"action": "echo", "text": "one"}})
            .to_string(),
        serde_json::json!({"session_id": "s2", "event": "request", "data": {"action": "echo", "text": "two"}})
            .to_string(),
    ];
    server.run(FakeTransport::new(lines)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let records = sink.records();
    assert!(records.iter().any(|r| r.contains("\"session_id\":\"s1\"") && r.contains("\"echo\":\"one\"")));
    assert!(records.iter().any(|r| r.contains("\"session_id\":\"s2\"") && r.contains("\"echo\":\"two\"")));
}

#[tokio::test]
async fn decode_failure_reports_but_does_not_stop_the_stream() {
    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink.clone() as Arc<dyn RecordSink>);
    let mut router = Router::new();
    router.register(
        |data| data.get("action") == Some(&serde_json::json!("echo")),
        EchoHandler,
    );
    let server = IoServer::new(writer, router, fast_heartbeat_config());

    let lines = vec![
        "{not valid json".to_string(),
        serde_json::json!({"session_id": "s1", "event": "request", "data": {"action": "echo", "text": "ok"}})
            .to_string(),
    ];
    server.run(FakeTransport::new(lines)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let records = sink.records();
    assert!(records.iter().any(|r| r.contains("failed to decode record")));
    assert!(records.iter().any(|r| r.contains("\"echo\":\"ok\"")));
}

#[tokio::test]
async fn unroutable_action_reports_a_dispatch_error() {
    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink.clone() as Arc<dyn RecordSink>);
    let server = IoServer::new(writer, Router::new(), fast_heartbeat_config());

    let line = serde_json::json!({
        "session_id": "s1",
        "event": "request",
        "data": {"action": "does_not_exist"},
    })
    .to_string();
    server.run(FakeTransport::new(vec![line])).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let records = sink.records();
    assert!(records.iter().any(|r| r.contains("DispatchError")));
}

#[tokio::test]
async fn heartbeats_are_emitted_on_their_own_interval_while_the_stream_is_idle() {
    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink.clone() as Arc<dyn RecordSink>);
    let server = Arc::new(IoServer::new(writer, Router::new(), fast_heartbeat_config()));

    // `IdleSource` never yields a line, so `run` blocks exactly like a real
    // persistent transport with nothing to say; drive it in the background
    // and abort the task once at least one heartbeat tick has fired.
    let server_clone = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        let _ = server_clone.run(IdleSource).await;
    });

    tokio::time::sleep(Duration::from_millis(1200)).await;
    handle.abort();

    let records = sink.records();
    assert!(records.iter().any(|r| r.contains("\"event\":\"heartbeat\"")));
}

#[tokio::test]
async fn worker_pool_capacity_matches_configured_max_worker() {
    let mut config = Config::default();
    config.server.max_worker = 1;
    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink as Arc<dyn RecordSink>);
    let server = IoServer::new(writer, Router::new(), Arc::new(config));

    assert_eq!(server.pool().available_permits(), 1);
}

struct GreeterTool;

#[async_trait]
impl ToolProvider for GreeterTool {
    async fn validate_credentials(&self, _credentials: serde_json::Value) -> plugin_runtime::Result<()> {
        Ok(())
    }

    async fn invoke_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> plugin_runtime::Result<serde_json::Value> {
        let name = parameters.get("name").and_then(|v| v.as_str()).unwrap_or("world");
        Ok(serde_json::json!({"greeting": format!("hello {name} from {tool_name}")}))
    }

    fn get_runtime_parameters(&self, _tool_name: &str) -> plugin_runtime::Result<serde_json::Value> {
        Ok(serde_json::json!([]))
    }
}

#[tokio::test]
async fn a_real_executor_dispatches_a_tool_invocation_through_the_router() {
    let mut tool_providers = HashMap::new();
    tool_providers.insert(
        "greeter".to_string(),
        Arc::new(GreeterTool) as Arc<dyn ToolProvider>,
    );
    let registry = Arc::new(Registry::new(tool_providers, HashMap::new(), vec![], HashMap::new(), HashMap::new()));
    let executor = Executor::new(registry);

    let sink = Arc::new(RecordingTransport::new());
    let writer = ResponseWriter::new(sink.clone() as Arc<dyn RecordSink>);
    let mut router = Router::new();
    router.register(
        |data| {
            let kind = data.get("type").and_then(|v| v.as_str());
            let action = data.get("action").and_then(|v| v.as_str());
            matches!((kind, action), (Some(k), Some(a)) if Action::from_wire(k, a).is_some())
        },
        executor,
    );
    let server = IoServer::new(writer, router, fast_heartbeat_config());

    let line = serde_json::json!({
        "session_id": "s1",
        "event": "request",
        "data": {
            "type": "tool",
            "action": "invoke_tool",
            "provider": "greeter",
            "tool_name": "wave",
            "parameters": {"name": "ferris"},
        },
    })
    .to_string();
    server.run(FakeTransport::new(vec![line])).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let records = sink.records();
    assert!(records.iter().any(|r| r.contains("hello ferris from wave")));
    assert!(records.iter().any(|r| r.contains("\"type\":\"end\"")));
}
