//! Collision detection over declared file accesses.
//!
//! The detector is pure and stateless: identical inputs always produce
//! identical output. It builds a file -> (task, operation) map, ignores
//! files touched by exactly one task, classifies each contended file,
//! and maps the worst severity to a deterministic resolution strategy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::models::{
    CollisionRisk, FileAccess, FileConflict, FileOp, ResolutionStrategy, SubAgent, Task,
};

/// A task id paired with the files it touches. The detector's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFileSet {
    pub task_id: String,
    pub files: Vec<FileAccess>,
}

impl TaskFileSet {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, op: FileOp) -> Self {
        self.files.push(FileAccess::new(path, op));
        self
    }
}

impl From<&Task> for TaskFileSet {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            files: task.files.clone(),
        }
    }
}

impl From<&SubAgent> for TaskFileSet {
    fn from(agent: &SubAgent) -> Self {
        Self {
            task_id: agent.task_id.clone(),
            files: agent.files.clone(),
        }
    }
}

/// Outcome of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionReport {
    /// Whether any conflict of severity low or above was found
    pub has_collision: bool,
    /// Maximum severity observed across files
    pub risk: CollisionRisk,
    /// Per-file conflicts, ordered by path
    pub conflicts: Vec<FileConflict>,
    /// Recommended resolution strategy
    pub strategy: ResolutionStrategy,
    /// True iff the chosen strategy is serialize
    pub require_serialization: bool,
    /// All tasks involved in at least one conflict, sorted
    pub conflicting_tasks: Vec<String>,
}

impl CollisionReport {
    fn safe() -> Self {
        Self {
            has_collision: false,
            risk: CollisionRisk::None,
            conflicts: Vec::new(),
            strategy: ResolutionStrategy::AllowParallel,
            require_serialization: false,
            conflicting_tasks: Vec::new(),
        }
    }
}

/// Stateless collision detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionDetector;

impl CollisionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect collisions among a set of annotated tasks.
    pub fn detect(&self, tasks: &[TaskFileSet]) -> CollisionReport {
        // BTreeMap keeps file iteration order stable across calls.
        let mut by_path: BTreeMap<&str, BTreeSet<(&str, FileOp)>> = BTreeMap::new();
        for task in tasks {
            for access in &task.files {
                by_path
                    .entry(access.path.as_str())
                    .or_default()
                    .insert((task.task_id.as_str(), access.op));
            }
        }

        let mut conflicts = Vec::new();
        for (path, entries) in &by_path {
            let task_ids: BTreeSet<&str> = entries.iter().map(|(id, _)| *id).collect();
            if task_ids.len() < 2 {
                continue;
            }

            let severity = classify(entries);
            if severity == CollisionRisk::None {
                continue;
            }

            let mut ops: Vec<FileOp> = entries.iter().map(|(_, op)| *op).collect();
            ops.sort();
            ops.dedup();

            conflicts.push(FileConflict {
                path: (*path).to_string(),
                task_ids: task_ids.iter().map(|id| (*id).to_string()).collect(),
                ops,
                severity,
            });
        }

        if conflicts.is_empty() {
            return CollisionReport::safe();
        }

        let risk = conflicts
            .iter()
            .map(|c| c.severity)
            .max()
            .unwrap_or(CollisionRisk::None);

        let strategy = resolution_for(risk, &conflicts);
        let conflicting_tasks: Vec<String> = conflicts
            .iter()
            .flat_map(|c| c.task_ids.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        CollisionReport {
            has_collision: true,
            risk,
            conflicts,
            require_serialization: strategy == ResolutionStrategy::Serialize,
            strategy,
            conflicting_tasks,
        }
    }
}

/// Classify the severity of one contended file.
fn classify(entries: &BTreeSet<(&str, FileOp)>) -> CollisionRisk {
    let tasks_with = |pred: fn(FileOp) -> bool| -> BTreeSet<&str> {
        entries
            .iter()
            .filter(|(_, op)| pred(*op))
            .map(|(id, _)| *id)
            .collect()
    };

    let deleters = tasks_with(|op| op == FileOp::Delete);
    let modifiers = tasks_with(|op| op == FileOp::Modify);
    let creators = tasks_with(|op| op == FileOp::Create);
    let writers = tasks_with(|op| op.is_write());
    let readers = tasks_with(|op| op == FileOp::Read);

    if !deleters.is_empty() && (!modifiers.is_empty() || !creators.is_empty()) && writers.len() >= 2
    {
        return CollisionRisk::Critical;
    }
    if deleters.len() >= 2 || modifiers.len() >= 2 {
        return CollisionRisk::High;
    }
    if creators.len() >= 2 {
        return CollisionRisk::Medium;
    }
    if writers.len() == 1 && !readers.is_empty() {
        return CollisionRisk::Low;
    }
    CollisionRisk::None
}

/// Deterministic severity -> strategy mapping.
fn resolution_for(risk: CollisionRisk, conflicts: &[FileConflict]) -> ResolutionStrategy {
    match risk {
        CollisionRisk::None | CollisionRisk::Low => ResolutionStrategy::AllowParallel,
        CollisionRisk::Medium => ResolutionStrategy::Reschedule,
        CollisionRisk::High => ResolutionStrategy::Serialize,
        CollisionRisk::Critical => {
            // Serialize only when a single pair of tasks is involved in
            // the critical conflicts; anything wider needs a human.
            let critical_tasks: BTreeSet<&str> = conflicts
                .iter()
                .filter(|c| c.severity == CollisionRisk::Critical)
                .flat_map(|c| c.task_ids.iter().map(String::as_str))
                .collect();
            if critical_tasks.len() == 2 {
                ResolutionStrategy::Serialize
            } else {
                ResolutionStrategy::ManualReview
            }
        }
    }
}
