//! Task domain model.
//!
//! Tasks are discrete units of work produced by an external planning
//! layer. They declare the resources they need, the files they touch,
//! and the tasks they depend on; the scheduler decides everything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Functional classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Development,
    Testing,
    Build,
    Deployment,
    Qa,
    Docs,
    Analysis,
    Monitoring,
    Security,
}

impl Default for TaskType {
    fn default() -> Self {
        Self::Development
    }
}

/// SDLC phase a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdlcPhase {
    Planning,
    Requirements,
    Design,
    Implementation,
    Testing,
    Deployment,
    Maintenance,
}

impl Default for SdlcPhase {
    fn default() -> Self {
        Self::Implementation
    }
}

/// Priority tier for tasks. Lower number means more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    Background = 5,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Background => "background",
        }
    }
}

/// Collision risk classification, ordered from safest to most dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionRisk {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for CollisionRisk {
    fn default() -> Self {
        Self::None
    }
}

impl CollisionRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Kind of shared resource a task can claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Cpu,
    Memory,
    Filesystem,
    Database,
    BuildPipeline,
    TestEnvironment,
}

/// A resource demand declared by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// Kind of resource
    pub resource_type: ResourceType,
    /// Name of the pool entry this demand draws from
    pub name: String,
    /// Units of capacity consumed while the task runs
    pub amount: u32,
    /// Whether the task needs the resource exclusively
    pub exclusive: bool,
}

impl ResourceRequirement {
    pub fn new(resource_type: ResourceType, name: impl Into<String>, amount: u32) -> Self {
        Self {
            resource_type,
            name: name.into(),
            amount,
            exclusive: false,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// Operation a task performs on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Read,
    Modify,
    Create,
    Delete,
}

impl FileOp {
    /// Whether this operation writes to the file.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// A single file access declared by a task or sub-agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccess {
    pub path: String,
    pub op: FileOp,
}

impl FileAccess {
    pub fn new(path: impl Into<String>, op: FileOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// A discrete unit of work submitted to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Planner-assigned identifier, unique within a plan
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Functional classification
    pub task_type: TaskType,
    /// SDLC phase
    pub phase: SdlcPhase,
    /// Priority tier (1=critical .. 5=background)
    pub priority: TaskPriority,
    /// Numeric 0-10 priority score, once computed by the priority engine
    pub score: Option<f64>,
    /// Estimated duration in seconds
    pub estimated_duration_secs: u64,
    /// Declared resource demands
    pub required_resources: Vec<ResourceRequirement>,
    /// Files this task reads/modifies/creates/deletes
    pub files: Vec<FileAccess>,
    /// Task ids this task depends on
    pub depends_on: Vec<String>,
    /// Assigned agent id, if any
    pub assigned_agent: Option<String>,
    /// Collision risk classification assigned at admission
    pub collision_risk: CollisionRisk,
    /// When the task was created
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            task_type: TaskType::default(),
            phase: SdlcPhase::default(),
            priority: TaskPriority::default(),
            score: None,
            estimated_duration_secs: 60,
            required_resources: Vec::new(),
            files: Vec::new(),
            depends_on: Vec::new(),
            assigned_agent: None,
            collision_risk: CollisionRisk::None,
            created_at: Utc::now(),
        }
    }

    /// Set the task type.
    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the priority tier.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the estimated duration in seconds.
    pub fn with_duration(mut self, secs: u64) -> Self {
        self.estimated_duration_secs = secs;
        self
    }

    /// Add a resource demand.
    pub fn with_resource(mut self, requirement: ResourceRequirement) -> Self {
        self.required_resources.push(requirement);
        self
    }

    /// Add a file access declaration.
    pub fn with_file(mut self, path: impl Into<String>, op: FileOp) -> Self {
        self.files.push(FileAccess::new(path, op));
        self
    }

    /// Add a dependency. Self-dependencies and duplicates are ignored.
    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if task_id != self.id && !self.depends_on.contains(&task_id) {
            self.depends_on.push(task_id);
        }
        self
    }

    /// Assign an agent.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent.into());
        self
    }

    /// Validate structural invariants before admission.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Task id cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("Task name cannot be empty".to_string());
        }
        if self.estimated_duration_secs == 0 {
            return Err("Task duration must be positive".to_string());
        }
        if self.required_resources.is_empty() {
            return Err("Task must declare at least one resource".to_string());
        }
        if self.depends_on.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        Ok(())
    }
}
