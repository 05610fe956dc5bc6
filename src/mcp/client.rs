//! MCP client session for one connected server.

use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequestParams, CallToolResult, Content, JsonObject, ProtocolVersion,
        ResourceContents,
    },
    service::{ClientInitializeError, ServiceError},
};

use crate::error::CoraError;

use super::schema::MCPToolSchema;
use super::transport::{MCPRunningService, MCPTransport, TransportKind};

/// Uniform capability every connected provider exposes, whatever its transport.
///
/// Implementations are driven one call at a time; callers serialize access
/// through a mutex.
#[async_trait]
pub trait ProviderSession: Send {
    fn transport_kind(&self) -> TransportKind;

    /// Tools the server currently advertises, in declaration order.
    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, CoraError>;

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, CoraError>;

    /// Tear the session down. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), CoraError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MCPToolCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

impl MCPToolCallResult {
    pub fn into_value_or_text(self) -> serde_json::Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let Some(text) = self.text_content {
            return serde_json::Value::String(text);
        }
        serde_json::Value::Array(self.content)
    }

    /// Text payload handed back to the model.
    pub fn into_text(self) -> String {
        match self.into_value_or_text() {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        }
    }
}

/// Client for a Model Context Protocol server.
pub struct MCPClient {
    server_id: String,
    kind: TransportKind,
    session: Option<MCPRunningService>,
}

impl MCPClient {
    /// Run the handshake over `transport`.
    ///
    /// The latest protocol version is offered first; a server that rejects it
    /// gets one retry with 2024-11-05.
    pub async fn connect(
        server_id: impl Into<String>,
        transport: &mut dyn MCPTransport,
    ) -> Result<Self, CoraError> {
        let server_id = server_id.into();
        let kind = transport.kind();

        let latest_client_info = rmcp::model::ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };

        let session = match transport.connect(latest_client_info).await {
            Ok(session) => session,
            Err(error) if should_retry_protocol_fallback(&error) => {
                tracing::debug!(server_id = %server_id, "retrying MCP handshake with 2024-11-05");
                let fallback_client_info = rmcp::model::ClientInfo {
                    protocol_version: ProtocolVersion::V_2024_11_05,
                    ..Default::default()
                };
                transport
                    .connect(fallback_client_info)
                    .await
                    .map_err(|error| map_client_initialize_error(&server_id, error))?
            }
            Err(error) => return Err(map_client_initialize_error(&server_id, error)),
        };

        Ok(Self {
            server_id,
            kind,
            session: Some(session),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn is_closed(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.is_closed())
            .unwrap_or(true)
    }

    fn session_ref(&self) -> Result<&MCPRunningService, CoraError> {
        match self.session.as_ref() {
            Some(session) if !session.is_closed() => Ok(session),
            _ => Err(CoraError::Stream(format!(
                "MCP session '{}' is closed",
                self.server_id
            ))),
        }
    }
}

#[async_trait]
impl ProviderSession for MCPClient {
    fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, CoraError> {
        let session = self.session_ref()?;

        let tools = match session.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                session
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error("list_tools", e))?
                    .tools
            }
            Err(e) => return Err(map_service_error("list_tools", e)),
        };

        Ok(tools.into_iter().map(map_mcp_tool_schema).collect())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, CoraError> {
        let session = self.session_ref()?;
        let arguments = coerce_tool_arguments(name, arguments)?;

        let result = session
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error("call_tool", e))?;

        map_call_result(name, result)
    }

    async fn close(&mut self) -> Result<(), CoraError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session
            .cancel()
            .await
            .map(|reason| {
                tracing::debug!(server_id = %self.server_id, ?reason, "MCP session closed");
            })
            .map_err(|e| CoraError::Stream(format!("closing MCP session '{}': {e}", self.server_id)))
    }
}

fn should_retry_protocol_fallback(error: &ClientInitializeError) -> bool {
    match error {
        ClientInitializeError::JsonRpcError(error) => {
            let message = error.message.to_ascii_lowercase();
            message.contains("protocol") && message.contains("version")
        }
        _ => false,
    }
}

fn map_mcp_tool_schema(tool: rmcp::model::Tool) -> MCPToolSchema {
    MCPToolSchema {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

/// Normalize model-produced arguments into the object MCP expects.
///
/// Failures are reported as tool execution errors so the model can correct
/// its call.
fn coerce_tool_arguments(
    tool_name: &str,
    value: serde_json::Value,
) -> Result<Option<JsonObject>, CoraError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                CoraError::tool_execution(
                    tool_name,
                    format!("tool arguments must be valid JSON: {e}"),
                )
            })?;
            coerce_tool_arguments(tool_name, parsed)
        }
        other => Err(CoraError::tool_execution(
            tool_name,
            format!("tool arguments must be a JSON object; got {other}"),
        )),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<MCPToolCallResult, CoraError> {
    let text_content = extract_text_content(&result.content);
    let content = result
        .content
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect::<Vec<_>>();

    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .or_else(|| text_content.clone())
            .unwrap_or_else(|| "MCP tool returned an error result".into());

        return Err(CoraError::tool_execution(name, message));
    }

    Ok(MCPToolCallResult {
        structured_content: result.structured_content,
        text_content,
        content,
    })
}

fn map_client_initialize_error(server_id: &str, error: ClientInitializeError) -> CoraError {
    let message = match error {
        ClientInitializeError::ConnectionClosed(context) => {
            format!("initialize connection closed: {context}")
        }
        ClientInitializeError::TransportError { error, context } => {
            format!("initialize transport error ({context}): {error}")
        }
        ClientInitializeError::JsonRpcError(error) => format!(
            "initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        ),
        ClientInitializeError::Cancelled => "initialize cancelled".to_string(),
        other => format!("initialize error: {other}"),
    };
    CoraError::connection(server_id, message)
}

fn map_service_error(context: &str, error: ServiceError) -> CoraError {
    match error {
        ServiceError::McpError(error) => CoraError::Stream(format!(
            "{context}: MCP error {}: {}",
            error.code.0, error.message
        )),
        ServiceError::TransportSend(error) => {
            CoraError::Stream(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            CoraError::Stream(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            CoraError::Stream(format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            CoraError::Stream(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => CoraError::Timeout(timeout.as_millis() as u64),
        other => CoraError::Stream(format!("{context}: MCP service error: {other}")),
    }
}
