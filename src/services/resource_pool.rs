//! Shared resource pool with capacity counters and exclusive holders.
//!
//! The pool is owned by the parallel task manager; all capacity
//! mutation goes through it. Allocation is all-or-nothing: a task
//! either gets every declared resource or none.

use std::collections::HashMap;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{Resource, ResourceUtilization, Task};

/// Process-local shared resource pool.
#[derive(Debug, Default)]
pub struct ResourcePool {
    resources: HashMap<String, Resource>,
    usage: HashMap<String, u32>,
    exclusive_holders: HashMap<String, String>,
    /// Per-task allocations, so release is exact even after task edits
    held: HashMap<String, Vec<(String, u32)>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. Re-registering replaces capacity but keeps
    /// current usage.
    pub fn register(&mut self, resource: Resource) {
        self.usage.entry(resource.name.clone()).or_insert(0);
        self.resources.insert(resource.name.clone(), resource);
    }

    /// Check a task's declared demand against registered capacities.
    /// Used at admission: a demand that can never fit is a validation
    /// error, not a scheduling wait.
    pub fn check_demand(&self, task: &Task) -> SchedulerResult<()> {
        for req in &task.required_resources {
            let resource = self.resources.get(&req.name).ok_or_else(|| {
                SchedulerError::UnknownResource {
                    task_id: task.id.clone(),
                    resource: req.name.clone(),
                }
            })?;
            if req.amount > resource.capacity {
                return Err(SchedulerError::ResourceUnsatisfiable {
                    resource: req.name.clone(),
                    requested: req.amount,
                    capacity: resource.capacity,
                });
            }
        }
        Ok(())
    }

    /// Whether the task's full demand fits right now.
    pub fn can_allocate(&self, task: &Task) -> bool {
        task.required_resources.iter().all(|req| {
            let Some(resource) = self.resources.get(&req.name) else {
                return false;
            };
            let in_use = self.usage.get(&req.name).copied().unwrap_or(0);
            if (req.exclusive || resource.exclusive)
                && self.exclusive_holders.contains_key(&req.name)
            {
                return false;
            }
            // An exclusive claim needs the resource idle entirely.
            if (req.exclusive || resource.exclusive) && in_use > 0 {
                return false;
            }
            in_use + req.amount <= resource.capacity
        })
    }

    /// Allocate every declared resource for a task, or nothing.
    pub fn allocate(&mut self, task: &Task) -> SchedulerResult<HashMap<String, u32>> {
        self.check_demand(task)?;
        if !self.can_allocate(task) {
            return Err(SchedulerError::ExecutionFailed(format!(
                "Resources unavailable for task {}",
                task.id
            )));
        }

        let mut snapshot = HashMap::new();
        let mut held = Vec::new();
        for req in &task.required_resources {
            *self.usage.entry(req.name.clone()).or_insert(0) += req.amount;
            let exclusive = req.exclusive
                || self
                    .resources
                    .get(&req.name)
                    .is_some_and(|r| r.exclusive);
            if exclusive {
                self.exclusive_holders
                    .insert(req.name.clone(), task.id.clone());
            }
            snapshot.insert(req.name.clone(), req.amount);
            held.push((req.name.clone(), req.amount));
        }
        self.held.insert(task.id.clone(), held);
        Ok(snapshot)
    }

    /// Release everything a task holds. Idempotent.
    pub fn release(&mut self, task_id: &str) {
        let Some(held) = self.held.remove(task_id) else {
            return;
        };
        for (name, amount) in held {
            if let Some(in_use) = self.usage.get_mut(&name) {
                *in_use = in_use.saturating_sub(amount);
            }
            if self.exclusive_holders.get(&name).map(String::as_str) == Some(task_id) {
                self.exclusive_holders.remove(&name);
            }
        }
    }

    /// Point-in-time utilization snapshot, sorted by resource name.
    pub fn utilization(&self) -> Vec<ResourceUtilization> {
        let mut entries: Vec<ResourceUtilization> = self
            .resources
            .values()
            .map(|r| ResourceUtilization {
                name: r.name.clone(),
                capacity: r.capacity,
                in_use: self.usage.get(&r.name).copied().unwrap_or(0),
                exclusive_holder: self.exclusive_holders.get(&r.name).cloned(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Registered capacity for a resource name.
    pub fn capacity_of(&self, name: &str) -> Option<u32> {
        self.resources.get(name).map(|r| r.capacity)
    }

    /// Whether a resource is exclusive (by registration).
    pub fn is_exclusive(&self, name: &str) -> bool {
        self.resources.get(name).is_some_and(|r| r.exclusive)
    }
}
