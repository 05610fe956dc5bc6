//! Core types for the conversation loop.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::{ModelMessage, ToolCallRequest, Usage};

/// Where the loop is within a turn.
#[derive(Debug, Clone, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LoopState {
    AwaitingModel,
    HasToolCalls(Vec<ToolCallRequest>),
    FinalAnswer(String),
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model produced a plain answer.
    Answer { text: String },
    /// The round-trip cap was hit before the model stopped asking for tools.
    IterationLimitReached,
    /// The caller cancelled the turn.
    Cancelled,
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Model requests made during the turn.
    pub round_trips: usize,
    /// The full conversation as it stood when the loop stopped.
    pub messages: Vec<ModelMessage>,
    pub usage: Usage,
}

impl TurnReport {
    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            TurnOutcome::Answer { text } => Some(text),
            _ => None,
        }
    }
}
