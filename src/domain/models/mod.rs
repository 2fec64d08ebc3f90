//! Domain models: pure data types shared across the scheduler.

pub mod config;
pub mod conflict;
pub mod execution;
pub mod handoff;
pub mod priority;
pub mod resource;
pub mod task;
pub mod wave;

pub use config::{LoggingConfig, SchedulerConfig};
pub use conflict::{
    AgentRole, AgentStatus, ConflictResolution, FileConflict, ResolutionPattern,
    ResolutionStrategy, SubAgent,
};
pub use execution::{ExecutionStatus, TaskExecution};
pub use handoff::{AgentChain, ChainStatus, HandoffPriority, HandoffRequest};
pub use priority::{
    AdjustmentReason, CriticalityTier, PriorityAdjustment, PriorityContext, PriorityFactors,
    PriorityScore,
};
pub use resource::{Resource, ResourceUtilization};
pub use task::{
    CollisionRisk, FileAccess, FileOp, ResourceRequirement, ResourceType, SdlcPhase, Task,
    TaskPriority, TaskType,
};
pub use wave::{
    CheckpointReport, CoordinationCheckpoint, GateResult, HandoffPair, PlanResult, Wave,
    WaveResult, WaveStatus,
};
