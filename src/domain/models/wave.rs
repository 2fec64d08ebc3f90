//! Waves, checkpoints, and plan results.
//!
//! A wave groups task ids with an explicit ordinal and cross-wave
//! dependencies. Waves are immutable inputs to the wave executor;
//! results are appended in separate structs, never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pair of agents whose handoff a checkpoint verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPair {
    pub from_agent: String,
    pub to_agent: String,
}

/// Post-wave validation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationCheckpoint {
    /// Checkpoint name
    pub name: String,
    /// Whether a failure halts the plan
    pub blocking: bool,
    /// Quality gates to evaluate (e.g. "tests_pass", "lint_clean")
    pub quality_gates: Vec<String>,
    /// Validation steps to run
    pub validation_steps: Vec<String>,
    /// Agent handoffs to verify
    pub handoffs: Vec<HandoffPair>,
}

impl CoordinationCheckpoint {
    pub fn new(name: impl Into<String>, blocking: bool) -> Self {
        Self {
            name: name.into(),
            blocking,
            quality_gates: Vec::new(),
            validation_steps: Vec::new(),
            handoffs: Vec::new(),
        }
    }

    pub fn with_gate(mut self, gate: impl Into<String>) -> Self {
        self.quality_gates.push(gate.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.validation_steps.push(step.into());
        self
    }
}

/// An ordered batch of tasks executed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    /// Ordinal position in the plan
    pub ordinal: u32,
    /// Name for progress reporting
    pub name: String,
    /// Task ids in this wave
    pub task_ids: Vec<String>,
    /// Estimated duration of the wave in seconds
    pub estimated_duration_secs: u64,
    /// Agents participating in the wave
    pub agents: Vec<String>,
    /// Whether tasks may run in parallel
    pub parallel: bool,
    /// Ordinals of waves that must complete first
    pub depends_on_waves: Vec<u32>,
    /// Optional post-wave checkpoint
    pub checkpoint: Option<CoordinationCheckpoint>,
}

impl Wave {
    pub fn new(ordinal: u32, name: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            task_ids: Vec::new(),
            estimated_duration_secs: 0,
            agents: Vec::new(),
            parallel: true,
            depends_on_waves: Vec::new(),
            checkpoint: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_ids.push(task_id.into());
        self
    }

    pub fn with_dependency(mut self, ordinal: u32) -> Self {
        if !self.depends_on_waves.contains(&ordinal) {
            self.depends_on_waves.push(ordinal);
        }
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: CoordinationCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn with_estimate(mut self, secs: u64) -> Self {
        self.estimated_duration_secs = secs;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Validate structural invariants for plan input.
    pub fn validate(&self) -> Result<(), String> {
        if self.task_ids.is_empty() {
            return Err(format!("Wave {} has no tasks", self.ordinal));
        }
        if self.depends_on_waves.contains(&self.ordinal) {
            return Err(format!("Wave {} depends on itself", self.ordinal));
        }
        Ok(())
    }
}

/// Terminal status of a wave or plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl WaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

/// Result of a single quality gate or validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

/// Authoritative checkpoint verdict returned by the external validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointReport {
    pub passed: bool,
    pub blocking: bool,
    pub gate_results: Vec<GateResult>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub total_execution_time_ms: u64,
}

/// Outcome of one wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveResult {
    pub ordinal: u32,
    pub status: WaveStatus,
    /// Whether the wave's parallel flag was overridden to serialize
    pub serialized_override: bool,
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub checkpoint: Option<CheckpointReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Actual wall-clock duration in seconds
    pub actual_duration_secs: u64,
}

/// Outcome of a full plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub status: WaveStatus,
    pub wave_results: Vec<WaveResult>,
    pub completed_waves: usize,
    pub failed_waves: usize,
    pub blocked_waves: usize,
    /// Reason for the first blocking failure, if any
    pub blocked_reason: Option<String>,
    /// Sum of wave estimates, the theoretical fully-sequential cost
    pub sequential_estimate_secs: u64,
    /// Actual wall-clock duration
    pub actual_duration_secs: u64,
}

impl PlanResult {
    /// Time saved versus fully-sequential execution, as a percentage.
    /// Observability only, never used for control decisions.
    pub fn savings_percent(&self) -> f64 {
        if self.sequential_estimate_secs == 0 {
            return 0.0;
        }
        let saved = self.sequential_estimate_secs as f64 - self.actual_duration_secs as f64;
        (saved / self.sequential_estimate_secs as f64 * 100.0).max(0.0)
    }
}
