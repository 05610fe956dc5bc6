//! Model service boundary: the trait the conversation loop talks to and the
//! chat-completions providers behind it.

pub mod azure;
pub mod http;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ModelApi, ModelConfig};
use crate::error::CoraError;
use crate::types::{FinishReason, ModelMessage, ModelSettings, ToolCallRequest, Usage};

/// A request sent to the model service.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Full conversation, system message first.
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub settings: ModelSettings,
}

/// Tool definition sent to the model API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from the model service.
///
/// Non-empty `tool_calls` means the model wants tools run before it answers.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "azure").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse, CoraError>;
}

/// Create the provider described by `config`.
pub fn create_provider(config: &ModelConfig) -> Result<Box<dyn ModelProvider>, CoraError> {
    match config.api {
        ModelApi::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| CoraError::Authentication("Missing OPENAI_API_KEY".into()))?;
            Ok(Box::new(openai::OpenAiChatProvider::new(
                config.model.clone(),
                api_key,
                config.base_url.clone(),
            )))
        }
        ModelApi::Azure => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| CoraError::Authentication("Missing AZURE_AI_API_KEY".into()))?;
            let endpoint = config.base_url.clone().ok_or_else(|| {
                CoraError::Configuration("Missing AZURE_AI_ENDPOINT".into())
            })?;
            Ok(Box::new(azure::AzureInferenceProvider::new(
                endpoint,
                config.model.clone(),
                api_key,
                config.api_version.clone(),
            )))
        }
    }
}
