//! Error types for Cora.

use std::fmt;

use thiserror::Error;

/// Primary error type for all Cora operations.
#[derive(Error, Debug)]
pub enum CoraError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Handshake or transport failure while connecting to an MCP server.
    #[error("Connection to MCP server '{server_id}' failed: {message}")]
    Connection { server_id: String, message: String },

    #[error("No MCP servers connected")]
    NoProviders,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Model inference error: {0}")]
    ModelInference(String),

    #[error("Resource cleanup failed for {} resource(s): {}", .0.len(), format_failures(.0))]
    ResourceCleanup(Vec<CleanupFailure>),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// One resource that failed to release during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub resource: String,
    pub message: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

fn format_failures(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoraError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn connection(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CoraError>;
