//! MCP schema types.

use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;

/// Schema for a tool exactly as an MCP server advertises it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MCPToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// A tool in the aggregated catalog, tagged with the server that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    /// Name the model sees and calls.
    pub name: String,
    /// Name the owning server knows the tool by.
    pub upstream_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub server_id: String,
}

impl ToolDescriptor {
    pub fn from_schema(server_id: &str, exposed_name: String, schema: MCPToolSchema) -> Self {
        Self {
            name: exposed_name,
            upstream_name: schema.name,
            description: schema.description.unwrap_or_default(),
            input_schema: schema.input_schema,
            server_id: server_id.to_string(),
        }
    }

    /// Definition sent to the model service.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}
