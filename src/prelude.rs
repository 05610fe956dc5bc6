//! Convenience re-exports for common use.

pub use crate::agent_loop::{ConversationLoop, TurnOutcome, TurnReport};
pub use crate::config::{CoraConfig, ServerSpec};
pub use crate::error::{CoraError, Result};
pub use crate::mcp::{Catalog, CollisionPolicy, ProviderSession, ServerRegistry};
pub use crate::provider::{ModelProvider, ModelRequest, ModelResponse};
pub use crate::service::{Orchestrator, TurnRequest, TurnResponse};
pub use crate::types::{ContentPart, ImageContent, ModelMessage, Role, ToolCallRequest, ToolCallResult};
