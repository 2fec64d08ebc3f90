//! Port traits: boundaries to external collaborators.

pub mod agent_executor;
pub mod checkpoint_validator;
pub mod pattern_store;
pub mod progress_sink;

pub use agent_executor::{AgentExecutor, AgentOutcome};
pub use checkpoint_validator::{AutoApproveValidator, CheckpointValidator};
pub use pattern_store::{NullPatternStore, PatternMatch, PatternStore};
pub use progress_sink::{NullProgressSink, ProgressEvent, ProgressSink};
