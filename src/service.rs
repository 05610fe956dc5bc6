//! Orchestration service: owns the connected servers and answers user turns.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::agent_loop::{ConversationLoop, LoopEventSink, TurnOutcome, TurnReport};
use crate::config::{CoraConfig, ServerSpec};
use crate::error::{CleanupFailure, CoraError};
use crate::mcp::client::ProviderSession;
use crate::mcp::lifecycle::LifecycleManager;
use crate::mcp::registry::{ServerRegistry, SharedSession};
use crate::mcp::schema::ToolDescriptor;
use crate::mcp::transport::{self, TransportKind};
use crate::provider::{create_provider, ModelProvider};
use crate::tools::router::ToolRouter;
use crate::types::image::load_image;
use crate::types::{ImageContent, ModelMessage};
use crate::util::timeout::with_timeout;

/// Answer when no MCP server is connected.
pub const FALLBACK_NO_PROVIDERS: &str =
    "I'm sorry, I'm having trouble connecting to my tools right now. Please try again later.";
/// Answer when the model finished with empty text.
pub const FALLBACK_EMPTY_ANSWER: &str = "I processed your request, but I'm having trouble generating a response. Please try rephrasing your question.";
/// Answer when the turn failed.
pub const FALLBACK_MODEL_FAILURE: &str =
    "I encountered an error while processing your request. Please try again.";
/// Answer when the turn stopped before the model produced an answer.
pub const FALLBACK_INCOMPLETE: &str =
    "I wasn't able to finish working on your request. Please try again or rephrase it.";

/// One inbound user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub user_text: String,
    pub image: Option<ImageContent>,
}

impl TurnRequest {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageContent) -> Self {
        self.image = Some(image);
        self
    }

    /// Attach the image at `path`. An unreadable file is logged and the turn
    /// continues as text only.
    pub async fn with_image_path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match load_image(path).await {
            Ok(image) => self.image = Some(image),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "image not attached");
            }
        }
        self
    }

    fn into_message(self) -> ModelMessage {
        match self.image {
            Some(image) => ModelMessage::user_with_image(self.user_text, image),
            None => ModelMessage::user(self.user_text),
        }
    }
}

/// The answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResponse {
    pub answer_text: String,
}

/// What happened while connecting the configured servers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub connected: Vec<String>,
    /// Server id and the reason it is missing from the catalog.
    pub failed: Vec<(String, String)>,
}

/// Owns the server registry and lifecycle for the life of the process.
///
/// Construct once, call [`start`](Self::start), share by reference with
/// whatever serves conversations, and call [`stop`](Self::stop) on shutdown.
pub struct Orchestrator {
    config: CoraConfig,
    provider: Arc<dyn ModelProvider>,
    registry: RwLock<ServerRegistry>,
    lifecycle: Mutex<LifecycleManager>,
    event_sink: Option<LoopEventSink>,
}

impl Orchestrator {
    pub fn new(config: CoraConfig, provider: Arc<dyn ModelProvider>) -> Self {
        let registry = ServerRegistry::new(config.collision_policy);
        let lifecycle = LifecycleManager::new().with_release_timeout(config.timeouts.shutdown());
        Self {
            config,
            provider,
            registry: RwLock::new(registry),
            lifecycle: Mutex::new(lifecycle),
            event_sink: None,
        }
    }

    /// Build the model provider from `config.model` as well.
    pub fn from_config(config: CoraConfig) -> Result<Self, CoraError> {
        let provider: Arc<dyn ModelProvider> = Arc::from(create_provider(&config.model)?);
        Ok(Self::new(config, provider))
    }

    pub fn with_event_sink(mut self, sink: LoopEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &CoraConfig {
        &self.config
    }

    /// Connect every configured server.
    ///
    /// A server that fails to connect is logged and left out of the catalog;
    /// startup carries on with the rest.
    pub async fn start(&self) -> StartupReport {
        let mut report = StartupReport::default();
        for spec in &self.config.servers {
            match self.connect_server(spec).await {
                Ok(tools) => {
                    tracing::info!(server_id = %spec.id, tools, "connected to MCP server");
                    report.connected.push(spec.id.clone());
                }
                Err(error) => {
                    tracing::warn!(server_id = %spec.id, error = %error, "MCP server unavailable");
                    report.failed.push((spec.id.clone(), error.to_string()));
                }
            }
        }
        report
    }

    /// Connect one server and add its tools to the catalog.
    pub async fn connect_server(&self, spec: &ServerSpec) -> Result<usize, CoraError> {
        let client = transport::connect(spec, self.config.timeouts.handshake()).await?;
        self.register_session(spec.id.clone(), spec.kind(), Box::new(client))
            .await
    }

    /// Register the tools of `session` under `id` and track it for shutdown.
    ///
    /// A session whose tools cannot be listed, or that the registry refuses,
    /// is closed right away and never enters the catalog.
    pub async fn register_session(
        &self,
        id: impl Into<String>,
        kind: TransportKind,
        session: Box<dyn ProviderSession>,
    ) -> Result<usize, CoraError> {
        let id = id.into();
        let session: SharedSession = Arc::new(Mutex::new(session));

        let listed = {
            let mut guard = session.lock().await;
            with_timeout(self.config.timeouts.handshake(), guard.list_tools()).await
        };
        let tools = match listed {
            Ok(tools) => tools,
            Err(error) => {
                self.discard(&id, &session).await;
                return Err(CoraError::connection(&id, format!("listing tools: {error}")));
            }
        };

        let count = tools.len();
        let mut registry = self.registry.write().await;
        if let Err(error) = registry.insert(id.clone(), kind, Arc::clone(&session), tools) {
            drop(registry);
            self.discard(&id, &session).await;
            return Err(error);
        }
        self.lifecycle.lock().await.acquire_session(id, session);
        Ok(count)
    }

    async fn discard(&self, id: &str, session: &SharedSession) {
        let mut guard = session.lock().await;
        if let Err(error) = with_timeout(self.config.timeouts.shutdown(), guard.close()).await {
            tracing::warn!(server_id = %id, error = %error, "failed to close rejected MCP session");
        }
    }

    /// Release every session in reverse connection order and empty the catalog.
    ///
    /// Cleanup failures are logged and handed back for inspection, never
    /// raised. Safe to call more than once.
    pub async fn stop(&self) -> Vec<CleanupFailure> {
        let result = self.lifecycle.lock().await.release_all().await;
        self.registry.write().await.clear();
        match result {
            Ok(()) => {
                tracing::info!("orchestrator stopped");
                Vec::new()
            }
            Err(CoraError::ResourceCleanup(failures)) => {
                for failure in &failures {
                    tracing::error!(resource = %failure.resource, error = %failure.message, "cleanup failed");
                }
                failures
            }
            Err(error) => {
                tracing::error!(error = %error, "orchestrator stopped with cleanup failures");
                vec![CleanupFailure {
                    resource: "lifecycle".into(),
                    message: error.to_string(),
                }]
            }
        }
    }

    /// Current tool catalog with owning servers.
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        self.registry.read().await.all_tools()
    }

    pub async fn provider_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Run one turn and report exactly how it ended.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnReport, CoraError> {
        let catalog = self.registry.read().await.snapshot();
        let messages = vec![
            ModelMessage::system(self.config.system_prompt.clone()),
            request.into_message(),
        ];

        let mut runner = ConversationLoop::new(Arc::clone(&self.provider))
            .with_max_iterations(self.config.limits.max_iterations)
            .with_router(ToolRouter::new(self.config.timeouts.tool_call()))
            .with_settings(self.config.model.settings())
            .with_model_timeout(self.config.timeouts.model_request());
        if let Some(sink) = &self.event_sink {
            runner = runner.with_event_sink(Arc::clone(sink));
        }

        runner.run(&catalog, messages, cancel).await
    }

    /// Answer one turn, always with user-facing text.
    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResponse {
        self.handle_turn_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn handle_turn_with_cancel(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> TurnResponse {
        let answer_text = match self.run_turn(request, cancel).await {
            Ok(report) => match report.outcome {
                TurnOutcome::Answer { text } if text.trim().is_empty() => {
                    FALLBACK_EMPTY_ANSWER.to_string()
                }
                TurnOutcome::Answer { text } => text,
                TurnOutcome::IterationLimitReached | TurnOutcome::Cancelled => {
                    FALLBACK_INCOMPLETE.to_string()
                }
            },
            Err(CoraError::NoProviders) => {
                tracing::warn!("turn attempted with no MCP servers connected");
                FALLBACK_NO_PROVIDERS.to_string()
            }
            Err(error) => {
                tracing::error!(error = %error, "turn failed");
                FALLBACK_MODEL_FAILURE.to_string()
            }
        };
        TurnResponse { answer_text }
    }
}
