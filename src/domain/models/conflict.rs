//! File conflicts, resolutions, and the sub-agent unit of work.
//!
//! `FileConflict` values are derived per detection pass, never stored
//! long-term. `SubAgent` is the conflict-tracking unit registered with
//! the conflict resolution engine, one per task-to-agent assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{CollisionRisk, FileAccess, FileOp};

/// Strategy chosen to resolve a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// No mutual exclusion needed; tasks may run together
    AllowParallel,
    /// Attach a delay to the later task
    Reschedule,
    /// Force the losing unit to wait for the winner's terminal state
    Serialize,
    /// Too risky for automatic resolution; needs a human
    ManualReview,
    /// Higher-priority unit proceeds, the other is blocked
    PriorityWins,
    /// Both proceed with a watch notification for runtime monitoring
    Merge,
    /// Shift the task onto different pool entries
    ResourceReallocation,
    /// Move the task to the least-loaded compatible agent
    AgentReassignment,
    /// Split the task into bounded sub-tasks
    TaskSplit,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowParallel => "allow_parallel",
            Self::Reschedule => "reschedule",
            Self::Serialize => "serialize",
            Self::ManualReview => "manual_review",
            Self::PriorityWins => "priority_wins",
            Self::Merge => "merge",
            Self::ResourceReallocation => "resource_reallocation",
            Self::AgentReassignment => "agent_reassignment",
            Self::TaskSplit => "task_split",
        }
    }
}

/// Outcome of resolving a single conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Strategy applied
    pub strategy: ResolutionStrategy,
    /// Actor that proceeds, if the strategy picks one
    pub winner: Option<String>,
    /// Actors blocked by this resolution
    pub blocked: Vec<String>,
    /// Estimated delay imposed on blocked actors, in seconds
    pub estimated_delay_secs: u64,
    /// Human-readable reasoning for audit trails
    pub reasoning: String,
    /// Whether the resolution was applied without human review
    pub auto_apply: bool,
}

/// A file touched by more than one task, with the observed operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConflict {
    /// File path under contention
    pub path: String,
    /// Tasks touching the file (sorted for determinism)
    pub task_ids: Vec<String>,
    /// Operations observed on the file (sorted, deduplicated)
    pub ops: Vec<FileOp>,
    /// Severity of the conflict
    pub severity: CollisionRisk,
}

/// Role of a sub-agent. A closed enumeration so dispatch is
/// exhaustiveness-checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Coder,
    Tester,
    Reviewer,
    Builder,
    Deployer,
    Documenter,
    Analyst,
    Monitor,
    Security,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
            Self::Builder => "builder",
            Self::Deployer => "deployer",
            Self::Documenter => "documenter",
            Self::Analyst => "analyst",
            Self::Monitor => "monitor",
            Self::Security => "security",
        }
    }
}

/// Status of a sub-agent in the conflict engine's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Blocked,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The conflict-tracking unit of work, one per task-to-agent assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgent {
    /// Unique identifier
    pub id: Uuid,
    /// Role performed by the agent
    pub role: AgentRole,
    /// Owning task id
    pub task_id: String,
    /// Numeric priority (0-10) used for arbitration
    pub priority: f64,
    /// Files this agent touches
    pub files: Vec<FileAccess>,
    /// Current status
    pub status: AgentStatus,
    /// Optional parent epic id
    pub parent_epic: Option<String>,
    /// Agent ids this agent must wait on
    pub depends_on: Vec<Uuid>,
    /// When the agent was registered
    pub started_at: DateTime<Utc>,
}

impl SubAgent {
    pub fn new(role: AgentRole, task_id: impl Into<String>, priority: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            task_id: task_id.into(),
            priority: priority.clamp(0.0, 10.0),
            files: Vec::new(),
            status: AgentStatus::Pending,
            parent_epic: None,
            depends_on: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Add a file access declaration.
    pub fn with_file(mut self, path: impl Into<String>, op: FileOp) -> Self {
        self.files.push(FileAccess::new(path, op));
        self
    }

    /// Set the parent epic.
    pub fn with_epic(mut self, epic: impl Into<String>) -> Self {
        self.parent_epic = Some(epic.into());
        self
    }

    /// Paths this agent touches.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }
}

/// A resolution recorded for future historical-similarity lookups.
/// Append-only; never consulted synchronously outside medium-risk decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPattern {
    /// Paths that were contended
    pub paths: Vec<String>,
    /// Severity that was observed
    pub severity: CollisionRisk,
    /// Strategy that was chosen
    pub strategy: ResolutionStrategy,
    /// Free-form outcome note
    pub outcome: String,
    /// When the resolution happened
    pub resolved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_agent_priority_clamped() {
        let agent = SubAgent::new(AgentRole::Coder, "t1", 15.0);
        assert_eq!(agent.priority, 10.0);
        let agent = SubAgent::new(AgentRole::Coder, "t1", -3.0);
        assert_eq!(agent.priority, 0.0);
    }

    #[test]
    fn test_sub_agent_paths() {
        let agent = SubAgent::new(AgentRole::Coder, "t1", 5.0)
            .with_file("src/main.rs", FileOp::Modify)
            .with_file("src/lib.rs", FileOp::Read);
        let paths: Vec<&str> = agent.paths().collect();
        assert_eq!(paths, vec!["src/main.rs", "src/lib.rs"]);
    }

    #[test]
    fn test_strategy_as_str() {
        assert_eq!(ResolutionStrategy::Serialize.as_str(), "serialize");
        assert_eq!(ResolutionStrategy::AllowParallel.as_str(), "allow_parallel");
    }
}
