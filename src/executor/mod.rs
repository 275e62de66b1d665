//! Executor (C11): maps dispatched actions onto registry-backed user-code
//! calls and normalizes their results into the wire's `session`-event
//! vocabulary.
//!
//! Grounded on `original_source/.../core/runtime/*` action handlers.

use std::sync::Arc;

use crate::error::{PluginRuntimeError, Result};
use crate::io_server::blob::chunk as chunk_blob;
use crate::io_server::http_bytes::{decode_request, encode_body_chunks, encode_status_frame};
use crate::io_server::router::Handler;
use crate::io_server::session::Session;
use crate::registry::Registry;

/// The full action set from `SPEC_FULL.md` §4.11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ToolValidateCredentials,
    ToolInvoke,
    ToolGetRuntimeParameters,
    ModelValidateProviderCredentials,
    ModelValidateModelCredentials,
    ModelInvokeLlm,
    ModelGetLlmNumTokens,
    ModelInvokeTextEmbedding,
    ModelGetTextEmbeddingNumTokens,
    ModelInvokeRerank,
    ModelInvokeTts,
    ModelGetTtsVoices,
    ModelInvokeSpeech2Text,
    ModelInvokeModeration,
    ModelGetAiModelSchemas,
    EndpointInvoke,
    AgentInvokeStrategy,
    OAuthGetAuthorizationUrl,
    OAuthGetCredentials,
}

impl Action {
    /// Parse the wire's `{type, action}` pair into an [`Action`].
    pub fn from_wire(kind: &str, action: &str) -> Option<Self> {
        use Action::*;
        Some(match (kind, action) {
            ("tool", "validate_credentials") => ToolValidateCredentials,
            ("tool", "invoke_tool") => ToolInvoke,
            ("tool", "get_runtime_parameters") => ToolGetRuntimeParameters,
            ("model", "validate_provider_credentials") => ModelValidateProviderCredentials,
            ("model", "validate_model_credentials") => ModelValidateModelCredentials,
            ("model", "invoke_llm") => ModelInvokeLlm,
            ("model", "get_llm_num_tokens") => ModelGetLlmNumTokens,
            ("model", "invoke_text_embedding") => ModelInvokeTextEmbedding,
            ("model", "get_text_embedding_num_tokens") => ModelGetTextEmbeddingNumTokens,
            ("model", "invoke_rerank") => ModelInvokeRerank,
            ("model", "invoke_tts") => ModelInvokeTts,
            ("model", "get_tts_voices") => ModelGetTtsVoices,
            ("model", "invoke_speech2text") => ModelInvokeSpeech2Text,
            ("model", "invoke_moderation") => ModelInvokeModeration,
            ("model", "get_ai_model_schemas") => ModelGetAiModelSchemas,
            ("endpoint", "invoke_endpoint") => EndpointInvoke,
            ("agent", "invoke_agent_strategy") => AgentInvokeStrategy,
            ("oauth", "get_authorization_url") => OAuthGetAuthorizationUrl,
            ("oauth", "get_credentials") => OAuthGetCredentials,
            _ => return None,
        })
    }
}

/// One action's raw result, before wire normalization.
pub enum ActionResult {
    /// A single structured value, e.g. a count or a validation outcome.
    Scalar(serde_json::Value),
    /// Raw bytes (TTS audio, a rendered file): hex-encoded as one scalar.
    Binary(Vec<u8>),
    /// An iterable of binary chunks (streamed audio): one hex scalar per
    /// chunk, no blob framing.
    BinaryChunks(Vec<Vec<u8>>),
    /// A generator of already-structured messages (tool/LLM streaming
    /// output); passed through unchanged except [`StreamMessage::Blob`]
    /// items, which route through the C12 blob-chunk streamer.
    Generator(Vec<StreamMessage>),
    /// An endpoint invocation's raw HTTP response, split on the wire into a
    /// status/headers frame followed by one-or-more hex body-chunk frames
    /// (`SPEC_FULL.md` §4.13, literal scenario S4).
    EndpointResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
}

/// One item of a [`ActionResult::Generator`] stream.
pub enum StreamMessage {
    Message(serde_json::Value),
    Blob(Vec<u8>),
}

/// Normalizes an [`ActionResult`] into the `session`-event `data` payloads
/// a handler should stream, in order.
pub fn normalize(result: ActionResult) -> Vec<serde_json::Value> {
    match result {
        ActionResult::Scalar(value) => vec![serde_json::json!({ "result": value })],
        ActionResult::Binary(bytes) => vec![serde_json::json!({ "result": hex::encode(bytes) })],
        ActionResult::BinaryChunks(chunks) => chunks
            .into_iter()
            .map(|c| serde_json::json!({ "result": hex::encode(c) }))
            .collect(),
        ActionResult::Generator(messages) => messages
            .into_iter()
            .flat_map(|message| match message {
                StreamMessage::Message(value) => vec![value],
                StreamMessage::Blob(bytes) => chunk_blob(&bytes)
                    .into_iter()
                    .map(|fragment| serde_json::to_value(fragment).expect("BlobChunk always serializes"))
                    .collect(),
            })
            .collect(),
        ActionResult::EndpointResponse { status, headers, body } => {
            let mut items = vec![encode_status_frame(status, &headers)];
            items.extend(encode_body_chunks(&body).into_iter().map(|hex_chunk| serde_json::json!({ "result": hex_chunk })));
            items
        }
    }
}

/// Dispatches one decoded action against the registry and streams the
/// normalized result through `session`.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<Registry>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, session: &Session, action: Action, data: serde_json::Value) -> Result<()> {
        let result = self.run(action, data).await?;
        for item in normalize(result) {
            session.stream(item).await?;
        }
        session.end().await
    }

    async fn run(&self, action: Action, data: serde_json::Value) -> Result<ActionResult> {
        match action {
            Action::ToolValidateCredentials => {
                let provider = field_str(&data, "provider")?;
                let credentials = data.get("credentials").cloned().unwrap_or_default();
                self.registry.tool(&provider)?.validate_credentials(credentials).await?;
                Ok(ActionResult::Scalar(serde_json::json!({"valid": true})))
            }
            Action::ToolInvoke => {
                let provider = field_str(&data, "provider")?;
                let tool_name = field_str(&data, "tool_name")?;
                let parameters = data.get("parameters").cloned().unwrap_or_default();
                let result = self
                    .registry
                    .tool(&provider)?
                    .invoke_tool(&tool_name, parameters)
                    .await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ToolGetRuntimeParameters => {
                let provider = field_str(&data, "provider")?;
                let tool_name = field_str(&data, "tool_name")?;
                let result = self.registry.tool(&provider)?.get_runtime_parameters(&tool_name)?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ModelValidateProviderCredentials => {
                let provider = field_str(&data, "provider")?;
                let credentials = data.get("credentials").cloned().unwrap_or_default();
                self.registry
                    .model(&provider)?
                    .validate_provider_credentials(credentials)
                    .await?;
                Ok(ActionResult::Scalar(serde_json::json!({"valid": true})))
            }
            Action::ModelValidateModelCredentials => {
                let provider = field_str(&data, "provider")?;
                let model = field_str(&data, "model")?;
                let credentials = data.get("credentials").cloned().unwrap_or_default();
                self.registry
                    .model(&provider)?
                    .validate_model_credentials(&model, credentials)
                    .await?;
                Ok(ActionResult::Scalar(serde_json::json!({"valid": true})))
            }
            Action::ModelInvokeLlm => {
                let (provider, model) = provider_and_model(&data)?;
                let result = self.registry.model(&provider)?.invoke_llm(&model, data).await?;
                Ok(ActionResult::Generator(vec![StreamMessage::Message(result)]))
            }
            Action::ModelGetLlmNumTokens => {
                let (provider, model) = provider_and_model(&data)?;
                let n = self.registry.model(&provider)?.get_llm_num_tokens(&model, data).await?;
                Ok(ActionResult::Scalar(serde_json::json!({"num_tokens": n})))
            }
            Action::ModelInvokeTextEmbedding => {
                let (provider, model) = provider_and_model(&data)?;
                let result = self
                    .registry
                    .model(&provider)?
                    .invoke_text_embedding(&model, data)
                    .await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ModelGetTextEmbeddingNumTokens => {
                let (provider, model) = provider_and_model(&data)?;
                let n = self
                    .registry
                    .model(&provider)?
                    .get_text_embedding_num_tokens(&model, data)
                    .await?;
                Ok(ActionResult::Scalar(serde_json::json!({"num_tokens": n})))
            }
            Action::ModelInvokeRerank => {
                let (provider, model) = provider_and_model(&data)?;
                let result = self.registry.model(&provider)?.invoke_rerank(&model, data).await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ModelInvokeTts => {
                let (provider, model) = provider_and_model(&data)?;
                let audio = self.registry.model(&provider)?.invoke_tts(&model, data).await?;
                Ok(ActionResult::Binary(audio))
            }
            Action::ModelGetTtsVoices => {
                let provider = field_str(&data, "provider")?;
                let model = field_str(&data, "model")?;
                let result = self.registry.model(&provider)?.get_tts_voices(&model).await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ModelInvokeSpeech2Text => {
                let (provider, model) = provider_and_model(&data)?;
                let result = self
                    .registry
                    .model(&provider)?
                    .invoke_speech2text(&model, data)
                    .await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ModelInvokeModeration => {
                let (provider, model) = provider_and_model(&data)?;
                let result = self.registry.model(&provider)?.invoke_moderation(&model, data).await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::ModelGetAiModelSchemas => {
                let provider = field_str(&data, "provider")?;
                let result = self.registry.model(&provider)?.get_ai_model_schemas().await?;
                Ok(ActionResult::Scalar(result))
            }
            Action::EndpointInvoke => {
                let method = field_str(&data, "method")?;
                let path = field_str(&data, "path")?;
                let raw_hex = field_str(&data, "raw_http_request")?;
                let request = decode_request(&raw_hex)?;
                let (route, params) = self
                    .registry
                    .match_route(&method, &path)
                    .ok_or_else(|| PluginRuntimeError::Dispatch {
                        message: format!("no endpoint route for {method} {path}"),
                    })?;
                let response = route.handler.invoke(request, params).await?;
                Ok(ActionResult::EndpointResponse {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                })
            }
            Action::AgentInvokeStrategy => {
                let provider = field_str(&data, "provider")?;
                let strategy = field_str(&data, "strategy")?;
                let result = self
                    .registry
                    .agent(&provider)?
                    .invoke_agent_strategy(&strategy, data)
                    .await?;
                Ok(ActionResult::Generator(vec![StreamMessage::Message(result)]))
            }
            Action::OAuthGetAuthorizationUrl => {
                let provider = field_str(&data, "provider")?;
                let url = self.registry.oauth(&provider)?.get_authorization_url(data).await?;
                Ok(ActionResult::Scalar(serde_json::json!({"authorization_url": url})))
            }
            Action::OAuthGetCredentials => {
                let provider = field_str(&data, "provider")?;
                let result = self.registry.oauth(&provider)?.get_credentials(data).await?;
                Ok(ActionResult::Scalar(result))
            }
        }
    }
}

/// Wires the executor into the router: `data`'s `type`/`action` pair picks
/// the [`Action`], and `data` itself (the whole dispatched payload) is
/// passed straight through as the action's arguments.
#[async_trait::async_trait]
impl Handler for Executor {
    type Input = serde_json::Value;

    async fn handle(&self, session: &Session, input: Self::Input) {
        let kind = input.get("type").and_then(|v| v.as_str()).unwrap_or_default();
        let action_name = input.get("action").and_then(|v| v.as_str()).unwrap_or_default();
        match Action::from_wire(kind, action_name) {
            Some(action) => {
                if let Err(e) = self.execute(session, action, input).await {
                    let _ = session.error("ExecutorError", e.to_string()).await;
                }
            }
            None => {
                let _ = session
                    .error("DispatchError", format!("no action registered for {kind}/{action_name}"))
                    .await;
            }
        }
    }
}

fn field_str(data: &serde_json::Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PluginRuntimeError::Validation {
                message: format!("missing required field `{key}`"),
            }
            .into()
        })
}

fn provider_and_model(data: &serde_json::Value) -> Result<(String, String)> {
    Ok((field_str(data, "provider")?, field_str(data, "model")?))
}
