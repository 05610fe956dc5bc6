//! OpenAI Chat Completions API provider.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::CoraError;
use crate::types::*;

use super::http::{bearer_headers, shared_client, status_to_error};
use super::{ModelProvider, ModelRequest, ModelResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiChatProvider {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiChatProvider {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiChatProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse, CoraError> {
        let body = build_request_body(&self.model, request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, messages = request.messages.len(), tools = request.tools.len(), "OpenAI generate_text");

        send_chat_request(&url, bearer_headers(&self.api_key), &body).await
    }
}

/// Chat-completions request body shared by the OpenAI and Azure providers.
pub(super) fn build_request_body(model: &str, request: &ModelRequest) -> serde_json::Value {
    let messages = request
        .messages
        .iter()
        .map(message_to_openai)
        .collect::<Vec<_>>();

    let mut obj = serde_json::Map::new();
    obj.insert("model".into(), model.into());
    obj.insert("messages".into(), messages.into());

    if let Some(max) = request.settings.max_tokens {
        obj.insert("max_tokens".into(), max.into());
    }
    if let Some(temp) = request.settings.temperature {
        obj.insert("temperature".into(), temp.into());
    }
    if let Some(top_p) = request.settings.top_p {
        obj.insert("top_p".into(), top_p.into());
    }

    if !request.tools.is_empty() {
        let tool_defs: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        obj.insert("tools".into(), tool_defs.into());
    }

    serde_json::Value::Object(obj)
}

/// POST a chat-completions body and parse the first choice.
pub(super) async fn send_chat_request(
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<ModelResponse, CoraError> {
    let resp = shared_client()
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await?;

    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        let body_text = resp.text().await.unwrap_or_default();
        return Err(status_to_error(status, &body_text));
    }

    let data: OpenAiChatResponse = resp.json().await?;
    parse_chat_response(data)
}

fn parse_chat_response(data: OpenAiChatResponse) -> Result<ModelResponse, CoraError> {
    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CoraError::api(200, "No choices in chat completion response"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallRequest {
            id: tc.id,
            name: tc.function.name,
            arguments: serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments)),
        })
        .collect();

    Ok(ModelResponse {
        text: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::from_api),
        usage: data
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default(),
    })
}

fn message_to_openai(msg: &ModelMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if let Some(result) = msg.as_tool_result() {
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        });
    }

    let tool_calls = msg.tool_calls();
    if !tool_calls.is_empty() {
        let tc_json: Vec<serde_json::Value> = tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }
                })
            })
            .collect();
        let text = msg.text();
        return serde_json::json!({
            "role": role,
            "content": if text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(text) },
            "tool_calls": tc_json,
        });
    }

    // Simple single-text message
    if let [ContentPart::Text { text }] = msg.content.as_slice() {
        return serde_json::json!({ "role": role, "content": text });
    }

    let parts: Vec<serde_json::Value> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(serde_json::json!({
                "type": "text",
                "text": text,
            })),
            ContentPart::Image(img) => Some(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": img.data_url() }
            })),
            ContentPart::ToolCall(_) | ContentPart::ToolResult(_) => None,
        })
        .collect();

    serde_json::json!({ "role": role, "content": parts })
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
