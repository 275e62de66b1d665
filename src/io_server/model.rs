//! Wire data model shared by the codec, reader, writer, and dispatcher.
//!
//! See `SPEC_FULL.md` §3 for the authoritative shapes. These types are
//! intentionally permissive on `data` (`serde_json::Value`) since the core
//! never interprets payload contents itself -- that is the executor's job.

use serde::{Deserialize, Serialize};

/// One inbound JSON record: a request from the host, or a reply to a
/// backwards invocation the plugin issued earlier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub session_id: String,
    pub event: InboundEvent,
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
}

fn default_data() -> serde_json::Value {
    serde_json::Value::Null
}

/// Inbound envelope event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundEvent {
    Request,
    BackwardsResponse,
}

/// Outbound envelope event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundEvent {
    Log,
    Error,
    Session,
    Heartbeat,
}

/// One outbound JSON record written by the response writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOutputMessage {
    pub event: OutboundEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Inner payload of a `session` outbound event: the tagged union from
/// `SPEC_FULL.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    Stream { data: serde_json::Value },
    Invoke { data: serde_json::Value },
    End,
    Error { data: serde_json::Value },
}

/// A reply to a backwards invocation, carried in a `backwards_response`
/// inbound envelope's `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackwardsInvocationResponseEvent {
    pub backwards_request_id: String,
    pub event: BackwardsInvocationEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackwardsInvocationEventKind {
    Response,
    Error,
    End,
}

/// The fixed invocation-type constant each `Session` sub-API uses when
/// issuing a backwards invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeType {
    Tool,
    Llm,
    TextEmbedding,
    Rerank,
    Tts,
    Speech2Text,
    Moderation,
    App,
    WorkflowNode,
    Storage,
    File,
}

/// Outbound-first record a plugin sends over a persistent TCP connection,
/// before the host will exchange any other traffic (`SPEC_FULL.md` §4.2,
/// §6).
pub fn handshake_envelope(key: Option<&str>) -> serde_json::Value {
    serde_json::json!({"type": "handshake", "data": {"key": key}})
}

/// The manifest envelope a plugin writes as the first outbound record so
/// the host can verify its identity before normal dispatch begins -- the
/// same shape on stdio (once, at process start) and TCP (once per
/// handshake).
pub fn manifest_envelope(manifest: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"type": "manifest", "data": manifest})
}

/// One per-category declaration envelope in the sequence that follows the
/// manifest envelope (`tools`, `models`, `endpoints`).
pub fn declaration_envelope(category: &str, declarations: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"type": category, "data": declarations})
}

/// Terminal envelope closing the manifest/declaration sequence.
pub fn end_envelope() -> serde_json::Value {
    serde_json::json!({"type": "end", "data": {}})
}
