//! Registry (C5).
//!
//! Grounded on `original_source/.../plugin_entities` lookups. Populated
//! once at startup by an external loader (manifest + per-provider YAMLs +
//! dynamic class lookup) that is out of scope here (`SPEC_FULL.md` §1);
//! `Registry::new` simply takes the already-resolved maps.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PluginRuntimeError, Result};
use crate::io_server::http_bytes::{RawHttpRequest, RawHttpResponse};

/// User-code hook for one tool provider (spec.md §4.11's Tool action set).
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn validate_credentials(&self, credentials: serde_json::Value) -> Result<()>;
    async fn invoke_tool(&self, tool_name: &str, parameters: serde_json::Value) -> Result<serde_json::Value>;
    fn get_runtime_parameters(&self, tool_name: &str) -> Result<serde_json::Value>;
}

/// User-code hook for one model provider (spec.md §4.11's Model action set).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn validate_provider_credentials(&self, credentials: serde_json::Value) -> Result<()>;
    async fn validate_model_credentials(&self, model: &str, credentials: serde_json::Value) -> Result<()>;
    async fn invoke_llm(&self, model: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
    async fn get_llm_num_tokens(&self, model: &str, payload: serde_json::Value) -> Result<u64>;
    async fn invoke_text_embedding(&self, model: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
    async fn get_text_embedding_num_tokens(&self, model: &str, payload: serde_json::Value) -> Result<u64>;
    async fn invoke_rerank(&self, model: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
    async fn invoke_tts(&self, model: &str, payload: serde_json::Value) -> Result<Vec<u8>>;
    async fn get_tts_voices(&self, model: &str) -> Result<serde_json::Value>;
    async fn invoke_speech2text(&self, model: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
    async fn invoke_moderation(&self, model: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
    async fn get_ai_model_schemas(&self) -> Result<serde_json::Value>;
}

/// User-code hook invoked through the HTTP endpoint route table.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn invoke(&self, request: RawHttpRequest, path_params: PathParams) -> Result<RawHttpResponse>;
}

/// User-code hook for agent strategy invocation.
#[async_trait]
pub trait AgentStrategyProvider: Send + Sync {
    async fn invoke_agent_strategy(&self, strategy: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
}

/// User-code hook for OAuth flows.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn get_authorization_url(&self, payload: serde_json::Value) -> Result<String>;
    async fn get_credentials(&self, payload: serde_json::Value) -> Result<serde_json::Value>;
}

/// One registered HTTP endpoint route: a `/`-separated pattern where
/// `{name}` segments bind into [`PathParams`], plus the handler to invoke.
pub struct HttpRoute {
    pub method: String,
    pub pattern: String,
    pub handler: Arc<dyn EndpointHandler>,
}

/// Path parameters extracted by [`Registry::match_route`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(pub HashMap<String, String>);

/// The three lookup tables the core dispatches through: tool providers,
/// model providers, and the HTTP route table.
pub struct Registry {
    tool_providers: HashMap<String, Arc<dyn ToolProvider>>,
    model_providers: HashMap<String, Arc<dyn ModelProvider>>,
    http_routes: Vec<HttpRoute>,
    agent_providers: HashMap<String, Arc<dyn AgentStrategyProvider>>,
    oauth_providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl Registry {
    pub fn new(
        tool_providers: HashMap<String, Arc<dyn ToolProvider>>,
        model_providers: HashMap<String, Arc<dyn ModelProvider>>,
        http_routes: Vec<HttpRoute>,
        agent_providers: HashMap<String, Arc<dyn AgentStrategyProvider>>,
        oauth_providers: HashMap<String, Arc<dyn OAuthProvider>>,
    ) -> Self {
        Self {
            tool_providers,
            model_providers,
            http_routes,
            agent_providers,
            oauth_providers,
        }
    }

    pub fn tool(&self, provider: &str) -> Result<&Arc<dyn ToolProvider>> {
        self.tool_providers.get(provider).ok_or_else(|| {
            PluginRuntimeError::Registry {
                provider: provider.to_string(),
                kind: "tool".to_string(),
            }
            .into()
        })
    }

    pub fn model(&self, provider: &str) -> Result<&Arc<dyn ModelProvider>> {
        self.model_providers.get(provider).ok_or_else(|| {
            PluginRuntimeError::Registry {
                provider: provider.to_string(),
                kind: "model".to_string(),
            }
            .into()
        })
    }

    pub fn agent(&self, provider: &str) -> Result<&Arc<dyn AgentStrategyProvider>> {
        self.agent_providers.get(provider).ok_or_else(|| {
            PluginRuntimeError::Registry {
                provider: provider.to_string(),
                kind: "agent".to_string(),
            }
            .into()
        })
    }

    pub fn oauth(&self, provider: &str) -> Result<&Arc<dyn OAuthProvider>> {
        self.oauth_providers.get(provider).ok_or_else(|| {
            PluginRuntimeError::Registry {
                provider: provider.to_string(),
                kind: "oauth".to_string(),
            }
            .into()
        })
    }

    /// Find the first route whose method and pattern match `path`, binding
    /// `{segment}` placeholders into [`PathParams`].
    pub fn match_route(&self, method: &str, path: &str) -> Option<(&HttpRoute, PathParams)> {
        self.http_routes
            .iter()
            .filter(|route| route.method.eq_ignore_ascii_case(method))
            .find_map(|route| match_pattern(&route.pattern, path).map(|params| (route, params)))
    }
}

fn match_pattern(pattern: &str, path: &str) -> Option<PathParams> {
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (p, s) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = p.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            params.insert(name.to_string(), (*s).to_string());
        } else if p != s {
            return None;
        }
    }
    Some(PathParams(params))
}
