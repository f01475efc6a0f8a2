//! Model gateway trait, request shape, and provider routing.

pub mod anthropic;
pub mod http;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::MaestroConfig;
use crate::error::{MaestroError, Result};
use crate::types::{GatewayEvent, Turn};

/// Prefix that routes a model identifier to the Anthropic gateway.
const ANTHROPIC_PREFIX: &str = "anthropic/";

/// A tool descriptor as advertised to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Reasoning-effort hint for models that support it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// One generation step's request to a model gateway.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub system_prompt: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Provider-agnostic streaming capability of a model gateway.
///
/// One `stream_step` call corresponds to one model-generation step; the
/// returned stream is owned by the caller and released by dropping it.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic").
    fn provider_name(&self) -> &str;

    /// The model identifier this gateway instance serves.
    fn model_id(&self) -> &str;

    /// Open one streaming generation step.
    async fn stream_step(
        &self,
        request: &GatewayRequest,
    ) -> Result<BoxStream<'static, Result<GatewayEvent>>>;
}

/// Maps a model identifier to a gateway instance.
///
/// The orchestrator resolves through this seam so embedders and tests can
/// substitute their own gateways.
pub trait GatewayResolver: Send + Sync {
    fn resolve(&self, model: &str) -> Result<Box<dyn ModelGateway>>;
}

/// Default resolver: prefix routing against configured credentials.
pub struct ConfigGatewayResolver {
    config: MaestroConfig,
}

impl ConfigGatewayResolver {
    pub fn new(config: MaestroConfig) -> Self {
        Self { config }
    }
}

impl GatewayResolver for ConfigGatewayResolver {
    fn resolve(&self, model: &str) -> Result<Box<dyn ModelGateway>> {
        resolve_gateway(model, &self.config)
    }
}

/// Resolve a gateway for the given model identifier.
///
/// An identifier starting with `anthropic/` is dispatched to the Anthropic
/// gateway with the prefix stripped; any other identifier goes to the
/// default OpenAI-compatible gateway unmodified. A missing credential for
/// the resolved provider is a configuration error raised before any
/// streaming begins.
pub fn resolve_gateway(
    model: &str,
    config: &MaestroConfig,
) -> Result<Box<dyn ModelGateway>> {
    if let Some(model_id) = model.strip_prefix(ANTHROPIC_PREFIX) {
        let api_key = config.get_api_key("anthropic").ok_or_else(|| {
            MaestroError::Configuration("Missing ANTHROPIC_API_KEY".into())
        })?;
        return Ok(Box::new(anthropic::AnthropicGateway::new(
            model_id,
            api_key,
            config.get_base_url("anthropic"),
        )));
    }

    let api_key = config
        .get_api_key("openai")
        .ok_or_else(|| MaestroError::Configuration("Missing OPENAI_API_KEY".into()))?;
    Ok(Box::new(openai::OpenAiGateway::new(
        model,
        api_key,
        config.get_base_url("openai"),
    )))
}
