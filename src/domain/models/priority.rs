//! Priority scoring types.
//!
//! A `PriorityScore` is a 0-10 arbitration value broken down across
//! five weighted factors, with a reasoning trail and a confidence
//! estimate. Scores are produced by the priority engine from a
//! `PriorityContext`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Criticality tier of the work, p0 being the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalityTier {
    P0,
    P1,
    P2,
    P3,
    P4,
}

impl Default for CriticalityTier {
    fn default() -> Self {
        Self::P2
    }
}

/// Contextual attributes a score is computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityContext {
    /// Criticality tier
    pub criticality: CriticalityTier,
    /// How many other tasks this one blocks
    pub blocks_count: u32,
    /// How many tasks this one depends on
    pub depends_count: u32,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Optional business value on a 0-10 scale
    pub business_value: Option<f64>,
    /// Optional complexity estimate on a 0-10 scale
    pub complexity: Option<f64>,
    /// Whether the work is customer-facing
    pub customer_facing: bool,
    /// Whether the work is security-related
    pub security_related: bool,
    /// Optional SLA target in hours
    pub sla_hours: Option<f64>,
}

/// Breakdown of a score across its five weighted factors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityFactors {
    /// Criticality contribution (0-4)
    pub criticality: f64,
    /// Dependency/blocking pressure contribution (0-2)
    pub dependency: f64,
    /// Deadline urgency contribution (0-2)
    pub deadline: f64,
    /// Business value contribution (0-1)
    pub business_value: f64,
    /// Customer/security impact contribution (0-1)
    pub impact: f64,
}

/// A computed priority score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityScore {
    /// Total score (0-10, one decimal)
    pub total: f64,
    /// Factor breakdown
    pub factors: PriorityFactors,
    /// Ordered reasoning trail
    pub reasoning: Vec<String>,
    /// Confidence in the score, in [0, 1]
    pub confidence: f64,
    /// Similarity to a historical precedent, if one was found
    pub historical_similarity: Option<f64>,
}

/// Why a score was adjusted after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    DeadlineMoved,
    EscalatedByHuman,
    DependencyChanged,
    IncidentDeclared,
    ScopeReduced,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineMoved => "deadline_moved",
            Self::EscalatedByHuman => "escalated_by_human",
            Self::DependencyChanged => "dependency_changed",
            Self::IncidentDeclared => "incident_declared",
            Self::ScopeReduced => "scope_reduced",
        }
    }
}

/// Audit record for a dynamic priority adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityAdjustment {
    pub task_id: String,
    pub old_total: f64,
    pub new_total: f64,
    pub reason: AdjustmentReason,
    pub adjusted_at: DateTime<Utc>,
}
