//! Wavefront - Multi-Agent Task Orchestration Engine
//!
//! Wavefront schedules concurrent development tasks across cooperating
//! agents: it scores task priority, detects file-level collisions
//! before they happen, resolves conflicts between active agents, runs
//! tasks in resource-aware parallel batches, executes wave-based plans
//! with coordination checkpoints, and dispatches agent handoffs from
//! completion events.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic and domain models
//! - **Service Layer** (`services`): Scheduling and coordination logic
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging wiring
//!
//! External collaborators (the agent executor, the pattern store, the
//! checkpoint validator, the progress sink) sit behind ports in
//! `domain::ports`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wavefront::{ParallelTaskManager, SchedulerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = wavefront::ConfigLoader::load()?;
//!     wavefront::infrastructure::logging::init(&config.logging)?;
//!     let manager = ParallelTaskManager::new(config, my_executor());
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{SchedulerError, SchedulerResult};
pub use domain::models::{
    AgentChain, CollisionRisk, CoordinationCheckpoint, ExecutionStatus, FileAccess, FileOp,
    HandoffPriority, HandoffRequest, LoggingConfig, PlanResult, PriorityContext, PriorityScore,
    Resource, ResourceRequirement, ResourceType, ResolutionStrategy, SchedulerConfig, SubAgent,
    Task, TaskExecution, TaskPriority, Wave, WaveResult, WaveStatus,
};
pub use domain::ports::{
    AgentExecutor, AgentOutcome, CheckpointValidator, PatternStore, ProgressEvent, ProgressSink,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CollisionDetector, CollisionReport, ConflictEngine, HandoffDispatcher, ParallelTaskManager,
    PriorityEngine, TaskFileSet, WaveExecutor,
};
