//! Registry of connected MCP servers and the tool catalog built from them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::Mutex;

use crate::error::CoraError;
use crate::provider::ToolDefinition;

use super::client::ProviderSession;
use super::schema::{MCPToolSchema, ToolDescriptor};
use super::transport::TransportKind;

/// A provider session shared between the registry, catalog snapshots and the
/// lifecycle manager. The mutex keeps the session single-call-at-a-time.
pub type SharedSession = Arc<Mutex<Box<dyn ProviderSession>>>;

pub(crate) const NAMESPACE_SEPARATOR: &str = "__";

/// What happens when two servers advertise the same tool name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CollisionPolicy {
    /// The later registration takes over the name.
    #[default]
    LastWriterWins,
    /// Expose each tool as `<server_id>__<tool_name>`.
    Namespace,
    /// Refuse to register a server whose tools clash with existing ones.
    Reject,
}

/// One connected server.
pub struct ProviderConnection {
    pub id: String,
    pub kind: TransportKind,
    /// Tools in the order the server declared them.
    pub tools: Vec<MCPToolSchema>,
    session: SharedSession,
}

impl ProviderConnection {
    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }
}

impl std::fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// Where a tool call goes.
#[derive(Clone)]
pub struct ToolRoute {
    pub server_id: String,
    pub upstream_name: String,
    pub session: SharedSession,
}

impl std::fmt::Debug for ToolRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRoute")
            .field("server_id", &self.server_id)
            .field("upstream_name", &self.upstream_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexEntry {
    server_id: String,
    upstream_name: String,
}

/// Holds every connected server and the name index used to route calls.
pub struct ServerRegistry {
    policy: CollisionPolicy,
    providers: Vec<ProviderConnection>,
    tool_index: HashMap<String, IndexEntry>,
}

impl ServerRegistry {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            providers: Vec::new(),
            tool_index: HashMap::new(),
        }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// List the session's tools and register it under `id`.
    ///
    /// Returns the number of tools the server advertised.
    pub async fn register(
        &mut self,
        id: impl Into<String>,
        kind: TransportKind,
        session: SharedSession,
    ) -> Result<usize, CoraError> {
        let id = id.into();
        let tools = {
            let mut guard = session.lock().await;
            guard.list_tools().await?
        };
        let count = tools.len();
        self.insert(id, kind, session, tools)?;
        Ok(count)
    }

    /// Register a server whose tool list is already known.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        kind: TransportKind,
        session: SharedSession,
        tools: Vec<MCPToolSchema>,
    ) -> Result<(), CoraError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoraError::Configuration(
                "MCP server id must not be empty".into(),
            ));
        }
        if self.providers.iter().any(|p| p.id == id) {
            return Err(CoraError::Configuration(format!(
                "Duplicate MCP server id '{id}'"
            )));
        }

        let exposed: Vec<(String, String)> = tools
            .iter()
            .map(|tool| (self.exposed_name(&id, &tool.name), tool.name.clone()))
            .collect();

        if self.policy == CollisionPolicy::Reject {
            let clashes: Vec<&str> = exposed
                .iter()
                .filter(|(name, _)| self.tool_index.contains_key(name))
                .map(|(name, _)| name.as_str())
                .collect();
            if !clashes.is_empty() {
                return Err(CoraError::Configuration(format!(
                    "MCP server '{id}' advertises tools already registered: {}",
                    clashes.join(", ")
                )));
            }
        }

        for (name, upstream_name) in exposed {
            let entry = IndexEntry {
                server_id: id.clone(),
                upstream_name,
            };
            if let Some(previous) = self.tool_index.insert(name.clone(), entry) {
                if previous.server_id != id {
                    tracing::warn!(
                        tool = %name,
                        previous = %previous.server_id,
                        server_id = %id,
                        "tool name collision; later registration wins"
                    );
                }
            }
        }

        tracing::info!(server_id = %id, %kind, tools = tools.len(), "registered MCP server");
        self.providers.push(ProviderConnection {
            id,
            kind,
            tools,
            session,
        });
        Ok(())
    }

    /// Deduplicated catalog in registration order, then declaration order.
    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for provider in &self.providers {
            for tool in &provider.tools {
                let name = self.exposed_name(&provider.id, &tool.name);
                let owned = self
                    .tool_index
                    .get(&name)
                    .is_some_and(|entry| entry.server_id == provider.id);
                if owned && seen.insert(name.clone()) {
                    out.push(ToolDescriptor::from_schema(&provider.id, name, tool.clone()));
                }
            }
        }
        out
    }

    /// Id of the server that owns `tool_name`.
    pub fn resolve(&self, tool_name: &str) -> Result<&str, CoraError> {
        self.tool_index
            .get(tool_name)
            .map(|entry| entry.server_id.as_str())
            .ok_or_else(|| CoraError::UnknownTool(tool_name.to_string()))
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConnection> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn providers(&self) -> &[ProviderConnection] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Drop every provider. Sessions are closed by the lifecycle manager.
    pub fn clear(&mut self) {
        self.providers.clear();
        self.tool_index.clear();
    }

    /// Immutable view of the catalog for one conversation turn.
    pub fn snapshot(&self) -> Catalog {
        let tools = self.all_tools();
        let routes = tools
            .iter()
            .filter_map(|tool| {
                let provider = self.provider(&tool.server_id)?;
                Some((
                    tool.name.clone(),
                    ToolRoute {
                        server_id: provider.id.clone(),
                        upstream_name: tool.upstream_name.clone(),
                        session: provider.session(),
                    },
                ))
            })
            .collect();
        Catalog {
            tools,
            routes,
            provider_count: self.providers.len(),
        }
    }

    fn exposed_name(&self, server_id: &str, tool_name: &str) -> String {
        match self.policy {
            CollisionPolicy::Namespace => format!("{server_id}{NAMESPACE_SEPARATOR}{tool_name}"),
            CollisionPolicy::LastWriterWins | CollisionPolicy::Reject => tool_name.to_string(),
        }
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(CollisionPolicy::default())
    }
}

/// Snapshot of the registry taken at the start of a turn.
///
/// Later registrations never change a catalog already handed out.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
    routes: HashMap<String, ToolRoute>,
    provider_count: usize,
}

impl Catalog {
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::to_definition).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn provider_count(&self) -> usize {
        self.provider_count
    }

    pub fn resolve(&self, tool_name: &str) -> Result<&ToolRoute, CoraError> {
        self.routes
            .get(tool_name)
            .ok_or_else(|| CoraError::UnknownTool(tool_name.to_string()))
    }
}
