//! Wave-based plan execution.
//!
//! Executes waves strictly in ordinal order. Within a wave, tasks run
//! through the parallel task manager; between waves, explicit wave
//! dependencies gate progress and coordination checkpoints validate the
//! result before the next wave starts.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{PlanResult, Wave, WaveResult, WaveStatus};
use crate::domain::ports::{
    CheckpointValidator, NullProgressSink, ProgressEvent, ProgressSink,
};
use crate::services::collision_detector::{CollisionDetector, TaskFileSet};
use crate::services::task_manager::{BatchReport, ParallelTaskManager};

/// Executes wave plans against a shared task manager.
pub struct WaveExecutor {
    manager: Arc<ParallelTaskManager>,
    validator: Arc<dyn CheckpointValidator>,
    detector: CollisionDetector,
    sink: Arc<dyn ProgressSink>,
}

impl WaveExecutor {
    pub fn new(manager: Arc<ParallelTaskManager>, validator: Arc<dyn CheckpointValidator>) -> Self {
        Self {
            manager,
            validator,
            detector: CollisionDetector::new(),
            sink: Arc::new(NullProgressSink),
        }
    }

    /// Attach a progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Execute a full plan in ordinal order.
    ///
    /// A wave whose dependencies did not complete is blocked with zero
    /// tasks executed, and blocks the rest of the plan. A blocking
    /// checkpoint failure does the same. A failed wave is recorded and
    /// the plan continues, so independent later waves still run; waves
    /// that depended on the failure block naturally.
    pub async fn execute_plan(&self, mut waves: Vec<Wave>) -> SchedulerResult<PlanResult> {
        for wave in &waves {
            wave.validate().map_err(SchedulerError::ValidationFailed)?;
        }
        waves.sort_by_key(|w| w.ordinal);

        let started = Instant::now();
        let mut completed_ordinals: HashSet<u32> = HashSet::new();
        let mut wave_results = Vec::new();
        let mut blocked_reason: Option<String> = None;
        let mut sequential_estimate_secs = 0;

        for wave in &waves {
            let unmet: Vec<u32> = wave
                .depends_on_waves
                .iter()
                .copied()
                .filter(|dep| !completed_ordinals.contains(dep))
                .collect();
            if !unmet.is_empty() {
                let reason = format!(
                    "wave {} blocked on incomplete wave(s) {:?}",
                    wave.ordinal, unmet
                );
                warn!(ordinal = wave.ordinal, %reason, "wave blocked");
                wave_results.push(blocked_result(wave));
                blocked_reason = Some(reason);
                break;
            }

            sequential_estimate_secs += self.wave_estimate(wave).await;
            let result = self.execute_wave(wave).await?;
            let blocking_failure = result.status == WaveStatus::Blocked;
            if result.status == WaveStatus::Completed {
                completed_ordinals.insert(wave.ordinal);
            }
            if blocking_failure {
                blocked_reason = Some(format!(
                    "wave {} checkpoint failed a blocking gate",
                    wave.ordinal
                ));
            }
            wave_results.push(result);
            if blocking_failure {
                break;
            }
        }

        let completed_waves = wave_results
            .iter()
            .filter(|r| r.status == WaveStatus::Completed)
            .count();
        let failed_waves = wave_results
            .iter()
            .filter(|r| r.status == WaveStatus::Failed)
            .count();
        let blocked_waves = wave_results
            .iter()
            .filter(|r| r.status == WaveStatus::Blocked)
            .count();

        let status = if blocked_reason.is_some() {
            WaveStatus::Blocked
        } else if failed_waves > 0 {
            WaveStatus::Failed
        } else {
            WaveStatus::Completed
        };

        let result = PlanResult {
            status,
            wave_results,
            completed_waves,
            failed_waves,
            blocked_waves,
            blocked_reason,
            sequential_estimate_secs,
            actual_duration_secs: started.elapsed().as_secs(),
        };
        info!(
            status = status.as_str(),
            completed = completed_waves,
            failed = failed_waves,
            blocked = blocked_waves,
            savings_percent = result.savings_percent(),
            "plan settled"
        );
        self.sink
            .publish(ProgressEvent::PlanCompleted {
                status,
                savings_percent: result.savings_percent(),
            })
            .await;
        Ok(result)
    }

    /// Execute one wave.
    async fn execute_wave(&self, wave: &Wave) -> SchedulerResult<WaveResult> {
        let started_at = chrono::Utc::now();
        let started = Instant::now();
        self.sink
            .publish(ProgressEvent::WaveStarted {
                ordinal: wave.ordinal,
                task_count: wave.task_ids.len(),
            })
            .await;

        // A parallel wave gets a pre-flight collision pass; a required
        // serialization downgrades it rather than failing it.
        let mut serialized_override = false;
        let mut parallel = wave.parallel && wave.task_ids.len() > 1;
        if parallel {
            let mut sets = Vec::new();
            for id in &wave.task_ids {
                if let Some(task) = self.manager.task(id).await {
                    sets.push(TaskFileSet::from(&task));
                }
            }
            let report = self.detector.detect(&sets);
            if report.require_serialization {
                info!(
                    ordinal = wave.ordinal,
                    risk = report.risk.as_str(),
                    "serializing wave after collision pre-flight"
                );
                serialized_override = true;
                parallel = false;
            }
        }

        let report = if parallel {
            self.manager.execute_parallel(&wave.task_ids).await?
        } else {
            self.manager.execute_sequential(&wave.task_ids).await?
        };

        let (completed_tasks, failed_tasks) = split_outcomes(&report);
        let mut status = if failed_tasks.is_empty() {
            WaveStatus::Completed
        } else {
            WaveStatus::Failed
        };

        // The checkpoint runs once executions settle, even for a
        // failed wave; its verdict still matters for the record and a
        // blocking failure still halts the plan.
        let mut checkpoint_report = None;
        if let Some(checkpoint) = &wave.checkpoint {
            let report = self
                .validator
                .validate(checkpoint)
                .await
                .map_err(|e| SchedulerError::ExecutionFailed(e.to_string()))?;
            self.sink
                .publish(ProgressEvent::CheckpointEvaluated {
                    ordinal: wave.ordinal,
                    name: checkpoint.name.clone(),
                    report: report.clone(),
                })
                .await;
            if !report.passed {
                if checkpoint.blocking {
                    status = WaveStatus::Blocked;
                } else {
                    warn!(
                        ordinal = wave.ordinal,
                        checkpoint = %checkpoint.name,
                        "non-blocking checkpoint failed, continuing"
                    );
                }
            }
            checkpoint_report = Some(report);
        }

        self.sink
            .publish(ProgressEvent::WaveCompleted {
                ordinal: wave.ordinal,
                status,
            })
            .await;

        Ok(WaveResult {
            ordinal: wave.ordinal,
            status,
            serialized_override,
            completed_tasks,
            failed_tasks,
            checkpoint: checkpoint_report,
            started_at,
            finished_at: chrono::Utc::now(),
            actual_duration_secs: started.elapsed().as_secs(),
        })
    }

    /// Sequential-cost estimate for a wave: the declared estimate, or
    /// the sum of its tasks' estimates when none was declared.
    async fn wave_estimate(&self, wave: &Wave) -> u64 {
        if wave.estimated_duration_secs > 0 {
            return wave.estimated_duration_secs;
        }
        let mut total = 0;
        for id in &wave.task_ids {
            if let Some(task) = self.manager.task(id).await {
                total += task.estimated_duration_secs;
            }
        }
        total
    }
}

fn split_outcomes(report: &BatchReport) -> (Vec<String>, Vec<String>) {
    let mut completed = Vec::new();
    let mut failed = Vec::new();
    for result in &report.results {
        if result.status == crate::domain::models::ExecutionStatus::Completed {
            completed.push(result.task_id.clone());
        } else {
            failed.push(result.task_id.clone());
        }
    }
    (completed, failed)
}

fn blocked_result(wave: &Wave) -> WaveResult {
    let now = chrono::Utc::now();
    WaveResult {
        ordinal: wave.ordinal,
        status: WaveStatus::Blocked,
        serialized_override: false,
        completed_tasks: Vec::new(),
        failed_tasks: Vec::new(),
        checkpoint: None,
        started_at: now,
        finished_at: now,
        actual_duration_secs: 0,
    }
}
