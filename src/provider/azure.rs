//! Azure AI inference provider.

use async_trait::async_trait;
use tracing::debug;

use crate::error::CoraError;

use super::http::azure_headers;
use super::openai::{build_request_body, send_chat_request};
use super::{ModelProvider, ModelRequest, ModelResponse};

/// Chat completions against an Azure AI inference endpoint.
pub struct AzureInferenceProvider {
    url: String,
    model: String,
    api_key: String,
}

impl AzureInferenceProvider {
    /// `endpoint`: e.g. "https://my-project.services.ai.azure.com/models"
    /// `api_version`: e.g. "2025-01-01-preview"
    pub fn new(endpoint: String, model: String, api_key: String, api_version: String) -> Self {
        let url = format!(
            "{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            api_version
        );
        Self { url, model, api_key }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ModelProvider for AzureInferenceProvider {
    fn provider_name(&self) -> &str {
        "azure"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse, CoraError> {
        let body = build_request_body(&self.model, request);
        debug!(model = %self.model, messages = request.messages.len(), "Azure generate_text");
        send_chat_request(&self.url, azure_headers(&self.api_key), &body).await
    }
}
