//! Port for the external agent executor.
//!
//! The scheduler calls one executor per task and interprets nothing of
//! the result beyond success/failure and optional structured metrics.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::Task;

/// Result object returned by an agent executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Opaque output payload
    pub output: serde_json::Value,
    /// Optional structured metrics (e.g. tokens, files touched)
    pub metrics: HashMap<String, f64>,
}

impl AgentOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// External collaborator that performs the actual work of a task.
///
/// One call per task; the call may be an arbitrarily long-running
/// remote operation. An `Err` is a typed execution failure that the
/// scheduler recovers locally.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute a task and return its outcome.
    async fn execute(&self, task: &Task) -> Result<AgentOutcome>;
}
