//! Port for the progress/observability sink.
//!
//! The scheduler publishes structured events for external status
//! displays. Publishing is fire-and-continue: the core never blocks on
//! the sink, and sink errors are ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{CheckpointReport, WaveStatus};

/// Structured progress event published by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    TaskStarted {
        task_id: String,
    },
    TaskProgress {
        task_id: String,
        percent: u8,
    },
    TaskCompleted {
        task_id: String,
        duration_secs: u64,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    WaveStarted {
        ordinal: u32,
        task_count: usize,
    },
    WaveCompleted {
        ordinal: u32,
        status: WaveStatus,
    },
    CheckpointEvaluated {
        ordinal: u32,
        name: String,
        report: CheckpointReport,
    },
    PlanCompleted {
        status: WaveStatus,
        savings_percent: f64,
    },
    ChainStarted {
        chain: String,
        agent: String,
    },
    ChainAdvanced {
        chain: String,
        agent: String,
    },
    ChainCompleted {
        chain: String,
    },
    HandoffProcessed {
        to_agent: String,
        latency_ms: f64,
    },
    /// Watch notification for a merge resolution on a low-risk conflict
    ConflictWatch {
        path: String,
        task_ids: Vec<String>,
    },
}

/// One-way publish interface for progress events.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Publish an event. Implementations should return quickly; the
    /// scheduler does not retry or propagate failures.
    async fn publish(&self, event: ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn publish(&self, _event: ProgressEvent) {}
}
