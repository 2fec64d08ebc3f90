//! Domain errors for the Wavefront scheduler.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[String]) -> String {
    path.join(" -> ")
}

/// Scheduler-level errors.
///
/// Task-level execution failures are recovered locally and reported in
/// result structs; these errors cover admission, validation, and
/// plan-level control flow.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Critical collision on admission of {task_id}: {reason}")]
    CriticalCollision { task_id: String, reason: String },

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<String>),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Resource {resource} cannot satisfy demand of {requested} (capacity {capacity})")]
    ResourceUnsatisfiable {
        resource: String,
        requested: u32,
        capacity: u32,
    },

    #[error("Unknown resource in task {task_id}: {resource}")]
    UnknownResource { task_id: String, resource: String },

    #[error("Wave {wave} blocked: {reason}")]
    WaveBlocked { wave: u32, reason: String },

    #[error("No priority score recorded for task: {0}")]
    NoPriorityScore(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::SerializationError(err.to_string())
    }
}
