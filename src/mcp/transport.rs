//! MCP transport layer.
//!
//! Every transport converges on an rmcp [`RunningService`]: once the
//! handshake completes, the stdio and streamable HTTP paths look identical to
//! the rest of the crate.

use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, DynService, RoleClient, RunningService};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::{ServerSpec, TransportSpec};
use crate::error::CoraError;
use crate::util::timeout::with_timeout;

use super::client::MCPClient;

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

/// How a provider process is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait MCPTransport: Send {
    fn kind(&self) -> TransportKind;

    /// Open the channel and run the MCP initialize handshake.
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ClientInitializeError>;
}

mod http;
mod stdio;

pub use http::StreamableHttpTransport;
pub use stdio::StdioTransport;

/// Build the transport described by `spec`.
pub fn transport_for(spec: &TransportSpec) -> Box<dyn MCPTransport> {
    match spec {
        TransportSpec::Stdio { command, args, env } => Box::new(
            StdioTransport::new(command.clone(), args.clone()).envs(env.clone()),
        ),
        TransportSpec::Http { url, headers } => {
            let mut transport = StreamableHttpTransport::new(url.clone());
            for (name, value) in headers {
                transport = transport.header(name.clone(), value.clone());
            }
            Box::new(transport)
        }
    }
}

/// Connect to one MCP server and complete the handshake within `handshake_timeout`.
///
/// Any failure comes back as [`CoraError::Connection`] naming the server.
pub async fn connect(spec: &ServerSpec, handshake_timeout: Duration) -> Result<MCPClient, CoraError> {
    let mut transport = transport_for(&spec.transport);
    tracing::debug!(server_id = %spec.id, kind = %transport.kind(), "connecting to MCP server");

    with_timeout(handshake_timeout, MCPClient::connect(spec.id.clone(), transport.as_mut()))
        .await
        .map_err(|error| match error {
            CoraError::Connection { .. } => error,
            other => CoraError::connection(&spec.id, other.to_string()),
        })
}
