//! Service layer: scheduling logic on top of the domain model.

pub mod collision_detector;
pub mod conflict_engine;
pub mod handoff_dispatcher;
pub mod priority_engine;
pub mod resource_pool;
pub mod task_manager;
pub mod wave_executor;

pub use collision_detector::{CollisionDetector, CollisionReport, TaskFileSet};
pub use conflict_engine::ConflictEngine;
pub use handoff_dispatcher::{CompletionSignal, HandoffDispatcher, HandoffMetrics};
pub use priority_engine::PriorityEngine;
pub use resource_pool::ResourcePool;
pub use task_manager::{BatchReport, ParallelTaskManager, TaskRunResult};
pub use wave_executor::WaveExecutor;
