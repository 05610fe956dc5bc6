//! Shared test helpers: a scripted model provider and an in-memory MCP session.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use cora::error::CoraError;
use cora::mcp::{MCPToolCallResult, MCPToolSchema, ProviderSession, TransportKind};
use cora::provider::{ModelProvider, ModelRequest, ModelResponse};
use cora::types::*;

/// A mock provider that replays queued responses and records every request.
pub struct MockProvider {
    model_id: String,
    responses: Mutex<VecDeque<Result<ModelResponse, CoraError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Duration,
}

impl MockProvider {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a text response.
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(ModelResponse {
            text: text.to_string(),
            tool_calls: vec![],
            finish_reason: Some(FinishReason::Stop),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
                total_tokens: 30,
            },
        }));
    }

    /// Queue a tool call response.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue_tool_calls(vec![(id, name, args)]);
    }

    /// Queue one response carrying several tool calls.
    pub fn queue_tool_calls(&self, calls: Vec<(&str, &str, serde_json::Value)>) {
        self.responses.lock().unwrap().push_back(Ok(ModelResponse {
            text: String::new(),
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                })
                .collect(),
            finish_reason: Some(FinishReason::ToolCalls),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
        }));
    }

    pub fn queue_error(&self, error: CoraError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse, CoraError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(ModelResponse {
                text: "Mock response".to_string(),
                ..Default::default()
            })
        })
    }
}

type ToolHandler = Arc<dyn Fn(&serde_json::Value) -> Result<String, CoraError> + Send + Sync>;

/// In-memory MCP session with scripted tools.
pub struct MockSession {
    tools: Vec<(MCPToolSchema, ToolHandler)>,
    calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    closed: Arc<Mutex<bool>>,
    fail_close: bool,
    fail_list: bool,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
            fail_close: false,
            fail_list: false,
        }
    }

    /// Add a tool that answers every call with `reply`.
    pub fn tool(self, name: &str, reply: &str) -> Self {
        let reply = reply.to_string();
        self.tool_with(name, move |_| Ok(reply.clone()))
    }

    pub fn tool_with(
        mut self,
        name: &str,
        handler: impl Fn(&serde_json::Value) -> Result<String, CoraError> + Send + Sync + 'static,
    ) -> Self {
        self.tools.push((
            MCPToolSchema {
                name: name.to_string(),
                description: Some(format!("{name} tool")),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Arc::new(handler),
        ));
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<(String, serde_json::Value)>>> {
        Arc::clone(&self.calls)
    }

    pub fn closed_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.closed)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderSession for MockSession {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, CoraError> {
        if self.fail_list {
            return Err(CoraError::Stream("server went away".into()));
        }
        Ok(self.tools.iter().map(|(schema, _)| schema.clone()).collect())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, CoraError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        let handler = self
            .tools
            .iter()
            .find(|(schema, _)| schema.name == name)
            .map(|(_, handler)| Arc::clone(handler))
            .ok_or_else(|| CoraError::tool_execution(name, "no such tool on this server"))?;
        let text = handler(&arguments)?;
        Ok(MCPToolCallResult {
            structured_content: None,
            text_content: Some(text),
            content: Vec::new(),
        })
    }

    async fn close(&mut self) -> Result<(), CoraError> {
        *self.closed.lock().unwrap() = true;
        if self.fail_close {
            Err(CoraError::Stream("pipe already broken".into()))
        } else {
            Ok(())
        }
    }
}
