//! Events emitted while a turn runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ToolCallRequest, ToolCallResult};

/// Concrete event payloads emitted by the conversation loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEventPayload {
    ModelRequested {
        round_trip: usize,
        tools: usize,
    },
    ToolCallStarted {
        call: ToolCallRequest,
    },
    ToolCallFinished {
        result: ToolCallResult,
    },
    FinalAnswer {
        text: String,
    },
}

/// Envelope for loop events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: LoopEventPayload,
}

/// Callback receiving loop events as they happen.
pub type LoopEventSink = Arc<dyn Fn(LoopEvent) + Send + Sync>;

pub(crate) struct LoopEventEmitter {
    seq: std::sync::atomic::AtomicU64,
    sink: Option<LoopEventSink>,
}

impl LoopEventEmitter {
    pub(crate) fn new(sink: Option<LoopEventSink>) -> Self {
        Self {
            seq: std::sync::atomic::AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: LoopEventPayload) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let seq = self.seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        sink(LoopEvent {
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
