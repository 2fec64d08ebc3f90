//! Task execution records.
//!
//! One `TaskExecution` exists per admitted task. It tracks lifecycle
//! status, progress, timing, and a snapshot of allocated resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Admitted, waiting for resources
    Queued,
    /// Resources allocated, work in flight
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before completion
    Cancelled,
    /// Suspended; resource claims retained
    Paused,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<ExecutionStatus> {
        match self {
            // Failed from queued covers admission-time failures, e.g.
            // an unsatisfiable resource demand
            Self::Queued => vec![Self::Running, Self::Cancelled, Self::Failed],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Cancelled, Self::Paused],
            Self::Paused => vec![Self::Running, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Execution record for an admitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// Task this record belongs to
    pub task_id: String,
    /// Current lifecycle status
    pub status: ExecutionStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Delay attached by a reschedule mitigation, in seconds
    pub scheduled_delay_secs: u64,
    /// When the record was created (admission time)
    pub created_at: DateTime<Utc>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Snapshot of resource units held while running (name -> amount)
    pub resource_usage: HashMap<String, u32>,
    /// Error message if the execution failed
    pub error: Option<String>,
}

impl TaskExecution {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: ExecutionStatus::Queued,
            progress: 0,
            scheduled_delay_secs: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            resource_usage: HashMap::new(),
            error: None,
        }
    }

    /// Transition to a new status, stamping timestamps.
    pub fn transition_to(&mut self, new_status: ExecutionStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        match new_status {
            ExecutionStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
                if new_status == ExecutionStatus::Completed {
                    self.progress = 100;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Mark failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), String> {
        self.error = Some(error.into());
        self.transition_to(ExecutionStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
