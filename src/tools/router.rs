//! Routes model-issued tool calls to the MCP server that owns each tool.

use std::time::Duration;

use futures::future::join_all;

use crate::error::CoraError;
use crate::mcp::registry::Catalog;
use crate::types::{ToolCallRequest, ToolCallResult};
use crate::util::timeout::with_timeout;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes tool calls against a catalog snapshot.
///
/// Routing never fails the turn: unknown tools, server errors and timeouts
/// all come back as error results the model can read.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    call_timeout: Duration,
}

impl ToolRouter {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Execute one call.
    pub async fn route(&self, catalog: &Catalog, call: &ToolCallRequest) -> ToolCallResult {
        match self.try_route(catalog, call).await {
            Ok(content) => ToolCallResult::success(&call.id, content),
            Err(error) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %error, "tool call failed");
                ToolCallResult::error(&call.id, describe_failure(catalog, &error))
            }
        }
    }

    /// Execute every call from one model turn.
    ///
    /// Calls run concurrently; results come back in the order the calls were
    /// given. Calls to the same server queue on that server's session.
    pub async fn route_all(
        &self,
        catalog: &Catalog,
        calls: &[ToolCallRequest],
    ) -> Vec<ToolCallResult> {
        join_all(calls.iter().map(|call| self.route(catalog, call))).await
    }

    async fn try_route(
        &self,
        catalog: &Catalog,
        call: &ToolCallRequest,
    ) -> Result<String, CoraError> {
        let route = catalog.resolve(&call.name)?;
        tracing::debug!(
            tool = %call.name,
            server_id = %route.server_id,
            call_id = %call.id,
            "routing tool call"
        );

        // Waiting behind other calls to the same server is not charged to
        // this call's budget.
        let mut session = route.session.lock().await;
        let result = with_timeout(
            self.call_timeout,
            session.call_tool(&route.upstream_name, call.arguments.clone()),
        )
        .await?;

        Ok(result.into_text())
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

fn describe_failure(catalog: &Catalog, error: &CoraError) -> String {
    match error {
        CoraError::UnknownTool(name) => format!(
            "Error: unknown tool '{name}'. Available tools: {}",
            catalog.tool_names().join(", ")
        ),
        CoraError::ToolExecution { message, .. } => format!("Error: {message}"),
        CoraError::Timeout(ms) => format!("Error: tool call timed out after {ms}ms"),
        other => format!("Error: {other}"),
    }
}
