//! Priority scoring engine.
//!
//! Maps a task's contextual attributes to a 0-10 score with a factor
//! breakdown, a reasoning trail, and a confidence estimate. Scoring is
//! a deterministic weighted sum; the optional historical lookup only
//! influences confidence and degrades gracefully when absent.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{
    AdjustmentReason, CriticalityTier, PriorityAdjustment, PriorityContext, PriorityFactors,
    PriorityScore,
};
use crate::domain::ports::{NullPatternStore, PatternStore};

/// Namespace used for historical priority lookups.
const PRIORITY_NAMESPACE: &str = "priority";

/// Minimum similarity for a precedent to lift confidence.
const SIMILARITY_FLOOR: f64 = 0.7;

/// Priority scoring engine with a per-instance query history.
pub struct PriorityEngine {
    pattern_store: Arc<dyn PatternStore>,
    history: RwLock<HashMap<String, PriorityScore>>,
    adjustments: RwLock<Vec<PriorityAdjustment>>,
}

impl Default for PriorityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityEngine {
    /// Create an engine without a historical lookup.
    pub fn new() -> Self {
        Self::with_pattern_store(Arc::new(NullPatternStore))
    }

    /// Create an engine backed by a historical pattern store.
    pub fn with_pattern_store(pattern_store: Arc<dyn PatternStore>) -> Self {
        Self {
            pattern_store,
            history: RwLock::new(HashMap::new()),
            adjustments: RwLock::new(Vec::new()),
        }
    }

    /// Score a task from its context.
    ///
    /// The total is the capped sum of five weighted factors, rounded to
    /// one decimal. The result is recorded in the query history.
    pub async fn score(&self, task_id: &str, context: &PriorityContext) -> PriorityScore {
        let mut reasoning = Vec::new();

        let criticality = criticality_points(context.criticality);
        reasoning.push(format!(
            "criticality {:?} contributes {criticality:.1}",
            context.criticality
        ));

        let dependency = dependency_points(context.blocks_count, context.depends_count);
        if context.blocks_count > 0 {
            reasoning.push(format!(
                "blocks {} tasks, dependency pressure {dependency:.2}",
                context.blocks_count
            ));
        }

        let deadline = deadline_points(context);
        if context.deadline.is_some() {
            reasoning.push(format!("deadline urgency {deadline:.1}"));
        }

        let business_value = context
            .business_value
            .map_or(0.0, |v| (v / 10.0).clamp(0.0, 1.0));
        if context.business_value.is_some() {
            reasoning.push(format!("business value contributes {business_value:.2}"));
        }

        let mut impact = 0.0;
        if context.customer_facing {
            impact += 0.5;
            reasoning.push("customer-facing work".to_string());
        }
        if context.security_related {
            impact += 0.5;
            reasoning.push("security-related work".to_string());
        }

        let factors = PriorityFactors {
            criticality,
            dependency,
            deadline,
            business_value,
            impact,
        };

        let raw = criticality + dependency + deadline + business_value + impact;
        let total = (raw.min(10.0) * 10.0).round() / 10.0;
        reasoning.push(format!("total {total:.1} (raw {raw:.2}, capped at 10)"));

        let (confidence, historical_similarity) = self.confidence(task_id, context).await;

        let score = PriorityScore {
            total,
            factors,
            reasoning,
            confidence,
            historical_similarity,
        };

        debug!(task_id, total, confidence, "priority scored");
        self.history
            .write()
            .await
            .insert(task_id.to_string(), score.clone());
        score
    }

    /// Confidence from populated optional inputs, lifted by a strong
    /// historical precedent when the lookup is available.
    async fn confidence(&self, task_id: &str, context: &PriorityContext) -> (f64, Option<f64>) {
        let mut populated = 0u32;
        if context.deadline.is_some() {
            populated += 1;
        }
        if context.business_value.is_some() {
            populated += 1;
        }
        if context.complexity.is_some() {
            populated += 1;
        }
        if context.sla_hours.is_some() {
            populated += 1;
        }
        let base = (0.5 + f64::from(populated) * 0.1).min(0.9);

        let query = format!(
            "{task_id} criticality={:?} blocks={} customer={}",
            context.criticality, context.blocks_count, context.customer_facing
        );
        // The lookup is an external collaborator; failures fall back to
        // base confidence rather than surfacing.
        match self
            .pattern_store
            .query_similar(&query, PRIORITY_NAMESPACE, 1)
            .await
        {
            Ok(matches) => match matches.first() {
                Some(best) if best.similarity >= SIMILARITY_FLOOR => {
                    (base.max(best.similarity.min(1.0)), Some(best.similarity))
                }
                Some(best) => (base, Some(best.similarity)),
                None => (base, None),
            },
            Err(_) => (base, None),
        }
    }

    /// Dynamically adjust a previously computed score.
    ///
    /// Clamps the new total to [0, 10] and appends an audit record.
    /// Errors if the task has no prior score.
    pub async fn adjust_priority(
        &self,
        task_id: &str,
        reason: AdjustmentReason,
        delta: f64,
    ) -> SchedulerResult<PriorityScore> {
        let mut history = self.history.write().await;
        let score = history
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::NoPriorityScore(task_id.to_string()))?;

        let old_total = score.total;
        let new_total = ((old_total + delta).clamp(0.0, 10.0) * 10.0).round() / 10.0;
        score.total = new_total;
        score.reasoning.push(format!(
            "adjusted {old_total:.1} -> {new_total:.1} ({})",
            reason.as_str()
        ));

        self.adjustments.write().await.push(PriorityAdjustment {
            task_id: task_id.to_string(),
            old_total,
            new_total,
            reason,
            adjusted_at: Utc::now(),
        });

        Ok(score.clone())
    }

    /// All scored tasks, highest priority first. Ties break on task id
    /// so the ordering is stable.
    pub async fn sorted_priorities(&self) -> Vec<(String, f64)> {
        let history = self.history.read().await;
        let mut entries: Vec<(String, f64)> = history
            .iter()
            .map(|(id, score)| (id.clone(), score.total))
            .collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        entries
    }

    /// The most recent score for a task, if one exists.
    pub async fn score_for(&self, task_id: &str) -> Option<PriorityScore> {
        self.history.read().await.get(task_id).cloned()
    }

    /// Audit trail of dynamic adjustments.
    pub async fn adjustments(&self) -> Vec<PriorityAdjustment> {
        self.adjustments.read().await.clone()
    }
}

fn criticality_points(tier: CriticalityTier) -> f64 {
    match tier {
        CriticalityTier::P0 => 4.0,
        CriticalityTier::P1 => 3.0,
        CriticalityTier::P2 => 2.0,
        CriticalityTier::P3 => 1.0,
        CriticalityTier::P4 => 0.0,
    }
}

/// Blocking many downstream tasks outweighs having few upstream
/// dependencies of one's own.
fn dependency_points(blocks: u32, depends: u32) -> f64 {
    let base: f64 = match blocks {
        0 => 0.0,
        1..=2 => 1.0,
        3..=4 => 1.5,
        _ => 2.0,
    };
    let drag: f64 = if depends >= 5 { 0.5 } else { 0.0 };
    (base - drag).max(0.0)
}

/// Step function of hours remaining. A past deadline is maximum
/// urgency, same as an imminent one.
fn deadline_points(context: &PriorityContext) -> f64 {
    let Some(deadline) = context.deadline else {
        return 0.0;
    };
    let hours = (deadline - Utc::now()).num_minutes() as f64 / 60.0;
    if hours <= 2.0 {
        2.0
    } else if hours < 6.0 {
        1.5
    } else if hours < 24.0 {
        1.0
    } else if hours < 72.0 {
        0.5
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::PatternMatch;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FixedStore {
        similarity: f64,
    }

    #[async_trait]
    impl PatternStore for FixedStore {
        async fn query_similar(
            &self,
            _query: &str,
            _namespace: &str,
            _limit: usize,
        ) -> Result<Vec<PatternMatch>> {
            Ok(vec![PatternMatch {
                similarity: self.similarity,
                metadata: serde_json::json!({}),
            }])
        }

        async fn store(
            &self,
            _content: &str,
            _namespace: &str,
            _metadata: serde_json::Value,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl PatternStore for FailingStore {
        async fn query_similar(
            &self,
            _query: &str,
            _namespace: &str,
            _limit: usize,
        ) -> Result<Vec<PatternMatch>> {
            anyhow::bail!("store unavailable")
        }

        async fn store(
            &self,
            _content: &str,
            _namespace: &str,
            _metadata: serde_json::Value,
        ) -> Result<()> {
            anyhow::bail!("store unavailable")
        }
    }

    fn context_with_tier(tier: CriticalityTier) -> PriorityContext {
        PriorityContext {
            criticality: tier,
            ..PriorityContext::default()
        }
    }

    #[tokio::test]
    async fn test_score_in_bounds() {
        let engine = PriorityEngine::new();
        let context = PriorityContext {
            criticality: CriticalityTier::P0,
            blocks_count: 10,
            deadline: Some(Utc::now() + Duration::minutes(30)),
            business_value: Some(10.0),
            customer_facing: true,
            security_related: true,
            ..PriorityContext::default()
        };
        let score = engine.score("t1", &context).await;
        assert!(score.total <= 10.0);
        assert!(score.total >= 0.0);
        // 4 + 2 + 2 + 1 + 1 = 10, hits the cap exactly
        assert!((score.total - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_monotonic_in_criticality() {
        let engine = PriorityEngine::new();
        let mut previous = f64::MAX;
        for tier in [
            CriticalityTier::P0,
            CriticalityTier::P1,
            CriticalityTier::P2,
            CriticalityTier::P3,
            CriticalityTier::P4,
        ] {
            let score = engine.score("t", &context_with_tier(tier)).await;
            assert!(score.total <= previous, "{tier:?} broke monotonicity");
            previous = score.total;
        }
    }

    #[tokio::test]
    async fn test_past_deadline_is_max_urgency() {
        let context = PriorityContext {
            deadline: Some(Utc::now() - Duration::hours(5)),
            ..PriorityContext::default()
        };
        assert!((deadline_points(&context) - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_deadline_step_function() {
        let at = |hours: i64| PriorityContext {
            deadline: Some(Utc::now() + Duration::hours(hours)),
            ..PriorityContext::default()
        };
        assert!((deadline_points(&at(1)) - 2.0).abs() < f64::EPSILON);
        assert!((deadline_points(&at(4)) - 1.5).abs() < f64::EPSILON);
        assert!((deadline_points(&at(12)) - 1.0).abs() < f64::EPSILON);
        assert!((deadline_points(&at(48)) - 0.5).abs() < f64::EPSILON);
        assert!(deadline_points(&at(100)).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_blocking_many_outranks_blocking_few() {
        assert!(dependency_points(6, 0) > dependency_points(1, 0));
        assert!((dependency_points(6, 0) - 2.0).abs() < f64::EPSILON);
        assert!(dependency_points(0, 0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_confidence_grows_with_populated_inputs() {
        let engine = PriorityEngine::new();
        let sparse = engine.score("a", &PriorityContext::default()).await;

        let rich_context = PriorityContext {
            deadline: Some(Utc::now() + Duration::days(7)),
            business_value: Some(5.0),
            complexity: Some(3.0),
            sla_hours: Some(48.0),
            ..PriorityContext::default()
        };
        let rich = engine.score("b", &rich_context).await;
        assert!(rich.confidence > sparse.confidence);
        assert!((rich.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_strong_precedent_lifts_confidence() {
        let engine = PriorityEngine::with_pattern_store(Arc::new(FixedStore { similarity: 0.95 }));
        let score = engine.score("t1", &PriorityContext::default()).await;
        assert_eq!(score.historical_similarity, Some(0.95));
        assert!((score.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failing_store_falls_back_to_base_confidence() {
        let engine = PriorityEngine::with_pattern_store(Arc::new(FailingStore));
        let score = engine.score("t1", &PriorityContext::default()).await;
        assert!(score.historical_similarity.is_none());
        assert!((score.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_adjust_priority_clamps_and_audits() {
        let engine = PriorityEngine::new();
        engine
            .score("t1", &context_with_tier(CriticalityTier::P0))
            .await;

        let adjusted = engine
            .adjust_priority("t1", AdjustmentReason::IncidentDeclared, 20.0)
            .await
            .unwrap();
        assert!((adjusted.total - 10.0).abs() < f64::EPSILON);

        let adjusted = engine
            .adjust_priority("t1", AdjustmentReason::ScopeReduced, -30.0)
            .await
            .unwrap();
        assert!(adjusted.total.abs() < f64::EPSILON);

        let audit = engine.adjustments().await;
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].reason, AdjustmentReason::IncidentDeclared);
    }

    #[tokio::test]
    async fn test_adjust_unscored_task_errors() {
        let engine = PriorityEngine::new();
        let err = engine
            .adjust_priority("ghost", AdjustmentReason::DeadlineMoved, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoPriorityScore(_)));
    }

    #[tokio::test]
    async fn test_sorted_priorities_descending() {
        let engine = PriorityEngine::new();
        engine.score("low", &context_with_tier(CriticalityTier::P4)).await;
        engine.score("high", &context_with_tier(CriticalityTier::P0)).await;
        engine.score("mid", &context_with_tier(CriticalityTier::P2)).await;

        let sorted = engine.sorted_priorities().await;
        assert_eq!(sorted[0].0, "high");
        assert_eq!(sorted[2].0, "low");
    }
}
