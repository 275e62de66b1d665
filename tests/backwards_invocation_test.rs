//! Backwards-invocation client (C8) integration tests: a plugin-issued call
//! correlated by `backwards_request_id`, answered over the same fan-out the
//! IO server already decodes inbound envelopes through.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;

use plugin_runtime::io_server::backwards::{BackwardsInvocationClient, BackwardsInvocationOutcome};
use plugin_runtime::io_server::model::{Envelope, InboundEvent, InvokeType};
use plugin_runtime::io_server::reader::RequestReader;
use plugin_runtime::io_server::writer::{RecordSink, ResponseWriter};

#[derive(Debug, Default)]
struct RecordingSink {
    records: StdMutex<Vec<String>>,
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn write_record(&self, record: String) -> plugin_runtime::Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

fn reply_envelope(session_id: &str, backwards_request_id: &str, data: serde_json::Value) -> Envelope {
    Envelope {
        session_id: session_id.to_string(),
        event: InboundEvent::BackwardsResponse,
        data: serde_json::json!({
            "backwards_request_id": backwards_request_id,
            "event": data["event"],
            "data": data.get("data"),
            "message": data.get("message"),
        }),
        conversation_id: None,
        message_id: None,
        app_id: None,
        endpoint_id: None,
    }
}

#[tokio::test]
async fn tool_invocation_streams_multiple_responses_before_ending() {
    let reader = Arc::new(RequestReader::new());
    let writer = ResponseWriter::new(Arc::new(RecordingSink::default()));
    let client = BackwardsInvocationClient::new(Arc::clone(&reader), writer.clone(), "s1".to_string());

    client
        .invoke(InvokeType::Tool, serde_json::json!({"tool_name": "weather", "parameters": {}}))
        .await
        .unwrap();
    let id = client.backwards_request_id().to_string();

    reader
        .process_envelope(
            reply_envelope(
                "s1",
                &id,
                serde_json::json!({"event": "response", "data": {"chunk": 1}}),
            ),
            &writer,
        )
        .await;
    reader
        .process_envelope(
            reply_envelope(
                "s1",
                &id,
                serde_json::json!({"event": "response", "data": {"chunk": 2}}),
            ),
            &writer,
        )
        .await;
    reader
        .process_envelope(reply_envelope("s1", &id, serde_json::json!({"event": "end"})), &writer)
        .await;

    let mut chunks = Vec::new();
    loop {
        match client.next().await.unwrap() {
            BackwardsInvocationOutcome::Response(data) => chunks.push(data["chunk"].as_i64().unwrap()),
            BackwardsInvocationOutcome::End => break,
            BackwardsInvocationOutcome::Error { .. } => panic!("unexpected error outcome"),
        }
    }
    assert_eq!(chunks, vec![1, 2]);
}

#[tokio::test]
async fn host_error_reply_surfaces_as_terminal_error_outcome() {
    let reader = Arc::new(RequestReader::new());
    let writer = ResponseWriter::new(Arc::new(RecordingSink::default()));
    let client = BackwardsInvocationClient::new(Arc::clone(&reader), writer.clone(), "s1".to_string());

    client.invoke(InvokeType::Llm, serde_json::json!({})).await.unwrap();
    let id = client.backwards_request_id().to_string();

    reader
        .process_envelope(
            reply_envelope(
                "s1",
                &id,
                serde_json::json!({"event": "error", "message": "rate limited"}),
            ),
            &writer,
        )
        .await;

    match client.next().await.unwrap() {
        BackwardsInvocationOutcome::Error { message, .. } => {
            assert_eq!(message.as_deref(), Some("rate limited"));
        }
        other => panic!("expected Error outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn two_concurrent_invocations_on_the_same_session_do_not_cross_wires() {
    let reader = Arc::new(RequestReader::new());
    let writer = ResponseWriter::new(Arc::new(RecordingSink::default()));
    let client_a = BackwardsInvocationClient::new(Arc::clone(&reader), writer.clone(), "s1".to_string());
    let client_b = BackwardsInvocationClient::new(Arc::clone(&reader), writer.clone(), "s1".to_string());

    client_a.invoke(InvokeType::Tool, serde_json::json!({})).await.unwrap();
    client_b.invoke(InvokeType::Tool, serde_json::json!({})).await.unwrap();
    let id_a = client_a.backwards_request_id().to_string();
    let id_b = client_b.backwards_request_id().to_string();
    assert_ne!(id_a, id_b);

    reader
        .process_envelope(
            reply_envelope("s1", &id_b, serde_json::json!({"event": "response", "data": {"owner": "b"}})),
            &writer,
        )
        .await;
    reader
        .process_envelope(
            reply_envelope("s1", &id_a, serde_json::json!({"event": "response", "data": {"owner": "a"}})),
            &writer,
        )
        .await;

    match client_a.next().await.unwrap() {
        BackwardsInvocationOutcome::Response(data) => assert_eq!(data["owner"], "a"),
        other => panic!("expected Response, got {other:?}"),
    }
    match client_b.next().await.unwrap() {
        BackwardsInvocationOutcome::Response(data) => assert_eq!(data["owner"], "b"),
        other => panic!("expected Response, got {other:?}"),
    }
}
