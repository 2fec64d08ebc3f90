//! Handoff requests and agent chains.
//!
//! The handoff dispatcher reacts to completion events: pre-declared
//! chains advance immediately when their current agent finishes, and
//! ad hoc handoff requests drain from a priority-ordered queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority tier of a handoff request. Higher sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl HandoffPriority {
    /// Urgent and high handoffs drain immediately; medium and low wait
    /// for the next scheduling tick.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Urgent | Self::High)
    }
}

/// A request to activate a specific next agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub id: Uuid,
    /// Agent requesting the handoff
    pub from_agent: String,
    /// Agent to activate
    pub to_agent: String,
    /// Task the handoff belongs to
    pub task_id: String,
    pub priority: HandoffPriority,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

impl HandoffRequest {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        task_id: impl Into<String>,
        priority: HandoffPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            task_id: task_id.into(),
            priority,
            reason: String::new(),
            requested_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Status of an agent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Idle,
    Active,
    Completed,
    Failed,
}

/// A named, ordered list of agents activated in sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentChain {
    pub name: String,
    pub agents: Vec<String>,
    /// Index of the currently active agent
    pub position: usize,
    pub status: ChainStatus,
}

impl AgentChain {
    pub fn new(name: impl Into<String>, agents: Vec<String>) -> Self {
        Self {
            name: name.into(),
            agents,
            position: 0,
            status: ChainStatus::Idle,
        }
    }

    /// The agent at the current chain position, if the chain is active.
    pub fn current_agent(&self) -> Option<&str> {
        if self.status != ChainStatus::Active {
            return None;
        }
        self.agents.get(self.position).map(String::as_str)
    }

    /// Advance to the next agent. Returns the newly-active agent, or
    /// None when the chain is exhausted (and marks it completed).
    pub fn advance(&mut self) -> Option<&str> {
        self.position += 1;
        if self.position >= self.agents.len() {
            self.status = ChainStatus::Completed;
            return None;
        }
        self.agents.get(self.position).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_priority_ordering() {
        assert!(HandoffPriority::Urgent > HandoffPriority::High);
        assert!(HandoffPriority::High > HandoffPriority::Medium);
        assert!(HandoffPriority::Medium > HandoffPriority::Low);
    }

    #[test]
    fn test_immediate_tiers() {
        assert!(HandoffPriority::Urgent.is_immediate());
        assert!(HandoffPriority::High.is_immediate());
        assert!(!HandoffPriority::Medium.is_immediate());
        assert!(!HandoffPriority::Low.is_immediate());
    }

    #[test]
    fn test_chain_advance_to_completion() {
        let mut chain = AgentChain::new("deploy", vec!["build".into(), "test".into()]);
        chain.status = ChainStatus::Active;
        assert_eq!(chain.current_agent(), Some("build"));

        assert_eq!(chain.advance(), Some("test"));
        assert_eq!(chain.advance(), None);
        assert_eq!(chain.status, ChainStatus::Completed);
    }
}
