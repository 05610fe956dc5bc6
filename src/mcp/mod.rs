//! Model Context Protocol (MCP) servers: connection, registry and lifecycle.

pub mod client;
pub mod lifecycle;
pub mod registry;
pub mod schema;
pub mod transport;

pub use client::{MCPClient, MCPToolCallResult, ProviderSession};
pub use lifecycle::{LifecycleManager, ManagedResource, SessionResource};
pub use registry::{Catalog, CollisionPolicy, ProviderConnection, ServerRegistry, SharedSession, ToolRoute};
pub use schema::{MCPToolSchema, ToolDescriptor};
pub use transport::{MCPTransport, StdioTransport, StreamableHttpTransport, TransportKind};
