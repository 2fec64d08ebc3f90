//! Port for the external checkpoint validator.
//!
//! The wave executor treats the validator's verdict as authoritative
//! and never re-derives pass/fail itself.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{CheckpointReport, CoordinationCheckpoint, GateResult};

/// External component that evaluates a coordination checkpoint.
#[async_trait]
pub trait CheckpointValidator: Send + Sync {
    /// Validate a checkpoint and return the authoritative report.
    async fn validate(&self, checkpoint: &CoordinationCheckpoint) -> Result<CheckpointReport>;
}

/// Validator that passes every gate and step. Useful for plans without
/// real validation wiring and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproveValidator;

#[async_trait]
impl CheckpointValidator for AutoApproveValidator {
    async fn validate(&self, checkpoint: &CoordinationCheckpoint) -> Result<CheckpointReport> {
        let gate_results = checkpoint
            .quality_gates
            .iter()
            .chain(checkpoint.validation_steps.iter())
            .map(|name| GateResult {
                name: name.clone(),
                passed: true,
                detail: None,
            })
            .collect();
        Ok(CheckpointReport {
            passed: true,
            blocking: checkpoint.blocking,
            gate_results,
            warnings: Vec::new(),
            errors: Vec::new(),
            total_execution_time_ms: 0,
        })
    }
}
