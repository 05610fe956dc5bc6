//! Conversation loop runner.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::CoraError;
use crate::mcp::registry::Catalog;
use crate::provider::{ModelProvider, ModelRequest, ModelResponse};
use crate::tools::router::ToolRouter;
use crate::types::{ModelMessage, ModelSettings, Usage};
use crate::util::timeout::with_timeout;

use super::events::{LoopEventEmitter, LoopEventPayload, LoopEventSink};
use super::types::{LoopState, TurnOutcome, TurnReport};

const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// Drives one user turn to a final answer.
///
/// Each pass sends the conversation and the catalog to the model. Requested
/// tool calls are routed and their results appended, then the model is asked
/// again. The loop stops on a plain answer, on cancellation, or once
/// `max_iterations` model requests have been made. Tool calls returned by the
/// last allowed request are not run.
pub struct ConversationLoop {
    provider: Arc<dyn ModelProvider>,
    router: ToolRouter,
    settings: ModelSettings,
    max_iterations: usize,
    model_timeout: Duration,
    event_sink: Option<LoopEventSink>,
}

impl ConversationLoop {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            router: ToolRouter::default(),
            settings: ModelSettings::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            event_sink: None,
        }
    }

    /// Cap on model round trips per turn. Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_router(mut self, router: ToolRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_event_sink(mut self, sink: LoopEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the turn starting from `messages` (system message first, then the
    /// user input).
    ///
    /// Fails fast with [`CoraError::NoProviders`] when the catalog has no
    /// connected servers. Model failures end the turn with
    /// [`CoraError::ModelInference`]; tool failures are fed back to the model.
    pub async fn run(
        &self,
        catalog: &Catalog,
        messages: Vec<ModelMessage>,
        cancel: &CancellationToken,
    ) -> Result<TurnReport, CoraError> {
        if catalog.provider_count() == 0 {
            return Err(CoraError::NoProviders);
        }

        let emitter = LoopEventEmitter::new(self.event_sink.clone());
        let tools = catalog.tool_definitions();
        let mut messages = messages;
        let mut usage = Usage::default();
        let mut round_trips = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            tracing::trace!(%state, round_trips, "conversation loop step");
            state = match state {
                LoopState::AwaitingModel => {
                    round_trips += 1;
                    emitter.emit(LoopEventPayload::ModelRequested {
                        round_trip: round_trips,
                        tools: tools.len(),
                    });
                    tracing::debug!(
                        iteration = round_trips,
                        messages = messages.len(),
                        tools = tools.len(),
                        model = %self.provider.model_id(),
                        "requesting model turn"
                    );

                    let request = ModelRequest {
                        messages: messages.clone(),
                        tools: tools.clone(),
                        settings: self.settings.clone(),
                    };

                    let response = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Ok(cancelled(round_trips, messages, usage));
                        }
                        response = self.request_model(&request) => response?,
                    };

                    usage.merge(&response.usage);
                    if response.tool_calls.is_empty() {
                        messages.push(ModelMessage::assistant(response.text.clone()));
                        LoopState::FinalAnswer(response.text)
                    } else {
                        tracing::debug!(
                            iteration = round_trips,
                            tool_calls = response.tool_calls.len(),
                            "model requested tools"
                        );
                        messages.push(ModelMessage::assistant_tool_calls(
                            response.text,
                            response.tool_calls.clone(),
                        ));
                        LoopState::HasToolCalls(response.tool_calls)
                    }
                }
                LoopState::HasToolCalls(calls) => {
                    // No round trip is left to report results; skip the calls.
                    if round_trips >= self.max_iterations {
                        tracing::warn!(
                            max_iterations = self.max_iterations,
                            skipped_calls = calls.len(),
                            "tool loop exceeded max iterations"
                        );
                        return Ok(TurnReport {
                            outcome: TurnOutcome::IterationLimitReached,
                            round_trips,
                            messages,
                            usage,
                        });
                    }

                    for call in &calls {
                        emitter.emit(LoopEventPayload::ToolCallStarted { call: call.clone() });
                    }

                    let results = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Ok(cancelled(round_trips, messages, usage));
                        }
                        results = self.router.route_all(catalog, &calls) => results,
                    };

                    for result in results {
                        emitter.emit(LoopEventPayload::ToolCallFinished {
                            result: result.clone(),
                        });
                        messages.push(ModelMessage::tool_result(result));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::FinalAnswer(text) => {
                    emitter.emit(LoopEventPayload::FinalAnswer { text: text.clone() });
                    tracing::info!(
                        round_trips,
                        total_tokens = usage.total_tokens,
                        "turn completed"
                    );
                    return Ok(TurnReport {
                        outcome: TurnOutcome::Answer { text },
                        round_trips,
                        messages,
                        usage,
                    });
                }
            };
        }
    }

    async fn request_model(&self, request: &ModelRequest) -> Result<ModelResponse, CoraError> {
        with_timeout(self.model_timeout, self.provider.generate_text(request))
            .await
            .map_err(|error| {
                tracing::error!(error = %error, provider = %self.provider.provider_name(), "model request failed");
                match error {
                    CoraError::ModelInference(_) => error,
                    other => CoraError::ModelInference(other.to_string()),
                }
            })
    }
}

fn cancelled(round_trips: usize, messages: Vec<ModelMessage>, usage: Usage) -> TurnReport {
    tracing::debug!(round_trips, "turn cancelled");
    TurnReport {
        outcome: TurnOutcome::Cancelled,
        round_trips,
        messages,
        usage,
    }
}
