//! Parallel task manager.
//!
//! Owns the task registry, the shared resource pool, the dependency
//! graph, and per-agent workload counters. Validates and admits tasks
//! (consulting the collision detector), plans resource-aware
//! topological batches, and dispatches batches concurrently. A failure
//! in one batch member never cancels its siblings.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{
    CollisionRisk, ExecutionStatus, Resource, ResourceUtilization, ResolutionStrategy,
    SchedulerConfig, Task, TaskExecution,
};
use crate::domain::ports::{AgentExecutor, NullProgressSink, ProgressEvent, ProgressSink};
use crate::services::collision_detector::{CollisionDetector, CollisionReport, TaskFileSet};
use crate::services::resource_pool::ResourcePool;

/// Seconds of reschedule delay attached per conflicting task, scaled
/// by severity.
const RESCHEDULE_DELAY_UNIT_SECS: u64 = 30;

/// Result of one task's dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRunResult {
    pub task_id: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub duration_secs: u64,
}

/// Result of an `execute_parallel` call.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Batches in dispatch order (task ids)
    pub batches: Vec<Vec<String>>,
    pub results: Vec<TaskRunResult>,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Sum over batches of the longest member estimate; the modeled
    /// parallel wall-clock cost
    pub estimated_cost_secs: u64,
    pub actual_duration_secs: u64,
}

impl BatchReport {
    pub fn all_completed(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Scheduler core owning the task registry and resource pool.
pub struct ParallelTaskManager {
    config: SchedulerConfig,
    detector: CollisionDetector,
    executor: Arc<dyn AgentExecutor>,
    sink: Arc<dyn ProgressSink>,
    tasks: RwLock<HashMap<String, Task>>,
    executions: RwLock<HashMap<String, TaskExecution>>,
    pool: RwLock<ResourcePool>,
    /// Signalled whenever a task's resources are released
    resource_released: Notify,
    agent_load: RwLock<HashMap<String, usize>>,
}

impl ParallelTaskManager {
    pub fn new(config: SchedulerConfig, executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            config,
            detector: CollisionDetector::new(),
            executor,
            sink: Arc::new(NullProgressSink),
            tasks: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            pool: RwLock::new(ResourcePool::new()),
            resource_released: Notify::new(),
            agent_load: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a resource in the shared pool.
    pub async fn register_resource(&self, resource: Resource) {
        self.pool.write().await.register(resource);
    }

    /// Validate and admit a task.
    ///
    /// Rejects malformed tasks, dependency cycles, and critical
    /// collisions outright; otherwise applies the detector's
    /// recommended mitigation and creates a queued execution record.
    pub async fn add_task(&self, mut task: Task) -> SchedulerResult<CollisionReport> {
        task.validate()
            .map_err(SchedulerError::ValidationFailed)?;
        self.pool.read().await.check_demand(&task)?;

        // Cycle detection over the registry plus the candidate. A cycle
        // is fatal to admission, never partially executed.
        if let Some(cycle) = self.find_cycle(&task).await {
            return Err(SchedulerError::DependencyCycle(cycle));
        }

        let report = self.collisions_with_running(&task).await;
        if report.risk == CollisionRisk::Critical
            && report.strategy == ResolutionStrategy::ManualReview
        {
            return Err(SchedulerError::CriticalCollision {
                task_id: task.id.clone(),
                reason: format!(
                    "critical collision with {}",
                    report.conflicting_tasks.join(", ")
                ),
            });
        }

        let mut execution = TaskExecution::new(&task.id);
        task.collision_risk = report.risk;
        self.apply_mitigation(&mut task, &mut execution, &report)
            .await;

        debug!(
            task_id = %task.id,
            risk = report.risk.as_str(),
            strategy = report.strategy.as_str(),
            "task admitted"
        );
        self.executions
            .write()
            .await
            .insert(task.id.clone(), execution);
        self.tasks.write().await.insert(task.id.clone(), task);
        Ok(report)
    }

    /// Collisions between a candidate and all currently running tasks,
    /// filtered to conflicts the candidate participates in.
    async fn collisions_with_running(&self, candidate: &Task) -> CollisionReport {
        let executions = self.executions.read().await;
        let tasks = self.tasks.read().await;
        let mut sets: Vec<TaskFileSet> = executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Running)
            .filter_map(|e| tasks.get(&e.task_id))
            .map(TaskFileSet::from)
            .collect();
        sets.push(TaskFileSet::from(candidate));
        drop(tasks);
        drop(executions);

        let full = self.detector.detect(&sets);
        // Keep only conflicts that involve the candidate.
        let conflicts: Vec<_> = full
            .conflicts
            .into_iter()
            .filter(|c| c.task_ids.iter().any(|t| t == &candidate.id))
            .collect();
        if conflicts.is_empty() {
            return self.detector.detect(&[TaskFileSet::from(candidate)]);
        }
        let sets_for_candidate: Vec<TaskFileSet> = sets
            .iter()
            .filter(|s| {
                s.task_id == candidate.id
                    || conflicts
                        .iter()
                        .any(|c| c.task_ids.iter().any(|t| t == &s.task_id))
            })
            .cloned()
            .collect();
        self.detector.detect(&sets_for_candidate)
    }

    /// Apply the detector's recommended mitigation at admission.
    async fn apply_mitigation(
        &self,
        task: &mut Task,
        execution: &mut TaskExecution,
        report: &CollisionReport,
    ) {
        match report.strategy {
            ResolutionStrategy::Serialize => {
                // Block on every conflicting task's completion.
                for other in &report.conflicting_tasks {
                    if other != &task.id && !task.depends_on.contains(other) {
                        task.depends_on.push(other.clone());
                    }
                }
            }
            ResolutionStrategy::Reschedule => {
                let conflict_count = report
                    .conflicting_tasks
                    .iter()
                    .filter(|t| *t != &task.id)
                    .count() as u64;
                let severity_factor = match report.risk {
                    CollisionRisk::Medium => 2,
                    CollisionRisk::High => 3,
                    _ => 1,
                };
                execution.scheduled_delay_secs =
                    conflict_count * severity_factor * RESCHEDULE_DELAY_UNIT_SECS;

                // A conflicting task already runs on the same agent;
                // the delay alone will not help, so move the newcomer
                // to the least-loaded other agent.
                if let Some(agent) = task.assigned_agent.clone() {
                    let contended = {
                        let tasks = self.tasks.read().await;
                        report.conflicting_tasks.iter().any(|id| {
                            id != &task.id
                                && tasks.get(id).and_then(|t| t.assigned_agent.as_deref())
                                    == Some(agent.as_str())
                        })
                    };
                    if contended {
                        if let Some(other) = self.least_loaded_agent(Some(&agent)).await {
                            task.assigned_agent = Some(other);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// DFS over dependency edges with a recursion stack; returns the
    /// cycle path when the candidate closes a loop.
    async fn find_cycle(&self, candidate: &Task) -> Option<Vec<String>> {
        let tasks = self.tasks.read().await;
        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
        for t in tasks.values() {
            graph.insert(
                t.id.as_str(),
                t.depends_on.iter().map(String::as_str).collect(),
            );
        }
        graph.insert(
            candidate.id.as_str(),
            candidate.depends_on.iter().map(String::as_str).collect(),
        );

        fn visit<'a>(
            node: &'a str,
            graph: &HashMap<&'a str, Vec<&'a str>>,
            visited: &mut HashSet<&'a str>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            if stack.contains(&node) {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            if !visited.insert(node) {
                return None;
            }
            stack.push(node);
            if let Some(deps) = graph.get(node) {
                for dep in deps {
                    if let Some(cycle) = visit(dep, graph, visited, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            None
        }

        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        visit(candidate.id.as_str(), &graph, &mut visited, &mut stack)
    }

    /// Plan resource-aware topological batches.
    ///
    /// A task joins the current batch only if its dependencies are
    /// already processed and its demand fits the batch's running totals
    /// without violating an exclusive-resource constraint. When nothing
    /// fits and tasks remain, the highest-priority remainder is
    /// force-admitted to break the deadlock.
    async fn plan_batches(&self, tasks: &[Task]) -> Vec<Vec<String>> {
        let pool = self.pool.read().await;
        let executions = self.executions.read().await;

        let mut processed: HashSet<String> = executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .map(|e| e.task_id.clone())
            .collect();
        drop(executions);

        let mut remaining: Vec<&Task> = tasks.iter().collect();
        // Deterministic admission order: priority tier, then id.
        remaining.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        let mut batches = Vec::new();
        while !remaining.is_empty() {
            let mut batch: Vec<String> = Vec::new();
            let mut totals: HashMap<&str, u32> = HashMap::new();
            let mut exclusive_claimed: HashSet<&str> = HashSet::new();
            let mut admitted_idx: Vec<usize> = Vec::new();

            for (idx, task) in remaining.iter().enumerate() {
                let deps_met = task.depends_on.iter().all(|d| processed.contains(d));
                if !deps_met {
                    continue;
                }
                let fits = task.required_resources.iter().all(|req| {
                    let used = totals.get(req.name.as_str()).copied().unwrap_or(0);
                    let capacity = pool.capacity_of(&req.name).unwrap_or(0);
                    let exclusive = req.exclusive || pool.is_exclusive(&req.name);
                    if exclusive && (exclusive_claimed.contains(req.name.as_str()) || used > 0) {
                        return false;
                    }
                    used + req.amount <= capacity
                });
                if !fits {
                    continue;
                }
                for req in &task.required_resources {
                    *totals.entry(req.name.as_str()).or_insert(0) += req.amount;
                    if req.exclusive || pool.is_exclusive(&req.name) {
                        exclusive_claimed.insert(req.name.as_str());
                    }
                }
                batch.push(task.id.clone());
                admitted_idx.push(idx);
            }

            if batch.is_empty() {
                // Deadlock: force-admit the most urgent remainder.
                let forced = remaining
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id))
                    })
                    .map(|(idx, _)| idx);
                if let Some(idx) = forced {
                    let task = remaining[idx];
                    warn!(task_id = %task.id, "force-admitting task to break scheduling deadlock");
                    batch.push(task.id.clone());
                    admitted_idx.push(idx);
                }
            }

            for idx in admitted_idx.iter().rev() {
                let task = remaining.remove(*idx);
                processed.insert(task.id.clone());
            }
            batches.push(batch);
        }
        batches
    }

    /// Execute a set of admitted tasks in dependency-ordered parallel
    /// batches. Tasks whose dependencies failed are skipped, never
    /// force-started.
    pub async fn execute_parallel(&self, ids: &[String]) -> SchedulerResult<BatchReport> {
        let start = std::time::Instant::now();
        let tasks = self.fetch_tasks(ids).await?;

        let (runnable, skipped) = self.partition_by_dependency_health(tasks).await;
        let mut report = BatchReport::default();

        for task in &skipped {
            self.skip_unmet(&task.id, &mut report).await;
        }

        let batches = self.plan_batches(&runnable).await;
        let mut dispatched_batches = Vec::new();
        for batch in &batches {
            // A dependency may have failed in an earlier batch of this
            // same call; re-check outcomes before dispatching.
            let mut ready = Vec::new();
            for id in batch {
                if self.dependencies_succeeded(id, &runnable).await {
                    ready.push(id.clone());
                } else {
                    self.skip_unmet(id, &mut report).await;
                }
            }
            if ready.is_empty() {
                continue;
            }

            report.estimated_cost_secs += ready
                .iter()
                .filter_map(|id| runnable.iter().find(|t| &t.id == id))
                .map(|t| t.estimated_duration_secs)
                .max()
                .unwrap_or(0);
            let results = self.dispatch_batch(&ready, &runnable).await;
            for result in results {
                match result.status {
                    ExecutionStatus::Completed => report.completed += 1,
                    _ => report.failed += 1,
                }
                report.results.push(result);
            }
            dispatched_batches.push(ready);
        }

        report.batches = dispatched_batches;
        report.actual_duration_secs = start.elapsed().as_secs();
        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            batches = report.batches.len(),
            "parallel execution settled"
        );
        Ok(report)
    }

    /// Execute tasks strictly one after another, in the given order.
    pub async fn execute_sequential(&self, ids: &[String]) -> SchedulerResult<BatchReport> {
        let start = std::time::Instant::now();
        let tasks = self.fetch_tasks(ids).await?;
        let mut report = BatchReport::default();
        for task in &tasks {
            report.estimated_cost_secs += task.estimated_duration_secs;
            let result = self.run_one(task.clone()).await;
            match result.status {
                ExecutionStatus::Completed => report.completed += 1,
                _ => report.failed += 1,
            }
            report.batches.push(vec![task.id.clone()]);
            report.results.push(result);
        }
        report.actual_duration_secs = start.elapsed().as_secs();
        Ok(report)
    }

    async fn fetch_tasks(&self, ids: &[String]) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        ids.iter()
            .map(|id| {
                tasks
                    .get(id)
                    .cloned()
                    .ok_or_else(|| SchedulerError::TaskNotFound(id.clone()))
            })
            .collect()
    }

    /// Whether every dependency of a task has reached terminal
    /// success. Deferred to dispatch time so a failure earlier in the
    /// same call is seen.
    async fn dependencies_succeeded(&self, task_id: &str, tasks: &[Task]) -> bool {
        let Some(task) = tasks.iter().find(|t| t.id == task_id) else {
            return false;
        };
        let executions = self.executions.read().await;
        task.depends_on.iter().all(|dep| {
            executions
                .get(dep)
                .is_some_and(|e| e.status == ExecutionStatus::Completed)
        })
    }

    /// Cancel a task whose dependency did not succeed and record the
    /// skip in the report.
    async fn skip_unmet(&self, task_id: &str, report: &mut BatchReport) {
        {
            let mut executions = self.executions.write().await;
            if let Some(execution) = executions.get_mut(task_id) {
                let _ = execution.transition_to(ExecutionStatus::Cancelled);
                execution.error = Some("unmet dependency".to_string());
            }
        }
        report.results.push(TaskRunResult {
            task_id: task_id.to_string(),
            status: ExecutionStatus::Cancelled,
            error: Some("unmet dependency".to_string()),
            duration_secs: 0,
        });
        report.skipped += 1;
    }

    /// Split tasks into runnable ones and those with a failed,
    /// cancelled, or unknown dependency outside the set.
    async fn partition_by_dependency_health(&self, tasks: Vec<Task>) -> (Vec<Task>, Vec<Task>) {
        let executions = self.executions.read().await;
        let in_set: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let mut runnable = Vec::new();
        let mut skipped = Vec::new();
        for task in tasks.iter() {
            let healthy = task.depends_on.iter().all(|dep| {
                if in_set.contains(dep.as_str()) {
                    return true;
                }
                executions
                    .get(dep)
                    .is_some_and(|e| e.status == ExecutionStatus::Completed)
            });
            if healthy {
                runnable.push(task.clone());
            } else {
                skipped.push(task.clone());
            }
        }
        (runnable, skipped)
    }

    /// Dispatch all batch members concurrently and settle them
    /// independently.
    async fn dispatch_batch(&self, batch: &[String], tasks: &[Task]) -> Vec<TaskRunResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut futures = Vec::new();
        for id in batch {
            let Some(task) = tasks.iter().find(|t| &t.id == id).cloned() else {
                continue;
            };
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire().await;
                self.run_one(task).await
            });
        }
        futures::future::join_all(futures).await
    }

    /// Fail an execution before it ever started running.
    async fn fail_before_start(
        &self,
        task_id: &str,
        error: String,
        start: std::time::Instant,
    ) -> TaskRunResult {
        {
            let mut executions = self.executions.write().await;
            if let Some(execution) = executions.get_mut(task_id) {
                let _ = execution.fail(error.clone());
            }
        }
        TaskRunResult {
            task_id: task_id.to_string(),
            status: ExecutionStatus::Failed,
            error: Some(error),
            duration_secs: start.elapsed().as_secs(),
        }
    }

    /// Run one task end to end: allocate resources, execute through the
    /// agent executor with a timeout, and always release on the way out.
    async fn run_one(&self, task: Task) -> TaskRunResult {
        let start = std::time::Instant::now();
        let task_id = task.id.clone();

        let delay = {
            let executions = self.executions.read().await;
            executions
                .get(&task_id)
                .map_or(0, |e| e.scheduled_delay_secs)
        };
        if delay > 0 {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        // Busy resources are a suspension point, not a failure: wait
        // for a release and retry. Only an unsatisfiable demand fails.
        let wait_deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.task_timeout_secs);
        let snapshot = loop {
            let attempt = {
                let mut pool = self.pool.write().await;
                match pool.check_demand(&task) {
                    Err(err) => Some(Err(err)),
                    Ok(()) if pool.can_allocate(&task) => Some(pool.allocate(&task)),
                    Ok(()) => None,
                }
            };
            match attempt {
                Some(Ok(snapshot)) => break snapshot,
                Some(Err(err)) => {
                    return self.fail_before_start(&task_id, err.to_string(), start).await;
                }
                None => {
                    if tokio::time::Instant::now() >= wait_deadline {
                        let reason = format!(
                            "timed out after {} seconds waiting for resources",
                            self.config.task_timeout_secs
                        );
                        return self.fail_before_start(&task_id, reason, start).await;
                    }
                    let notified = self.resource_released.notified();
                    tokio::select! {
                        () = notified => {}
                        () = tokio::time::sleep(Duration::from_millis(25)) => {}
                    }
                }
            }
        };

        {
            let mut executions = self.executions.write().await;
            if let Some(execution) = executions.get_mut(&task_id) {
                execution.resource_usage = snapshot;
                let _ = execution.transition_to(ExecutionStatus::Running);
            }
        }
        if let Some(agent) = &task.assigned_agent {
            *self.agent_load.write().await.entry(agent.clone()).or_insert(0) += 1;
        }
        self.sink
            .publish(ProgressEvent::TaskStarted {
                task_id: task_id.clone(),
            })
            .await;

        let outcome = timeout(
            Duration::from_secs(self.config.task_timeout_secs),
            self.executor.execute(&task),
        )
        .await;

        // Release resources on every path, including failure.
        self.pool.write().await.release(&task_id);
        self.resource_released.notify_waiters();
        if let Some(agent) = &task.assigned_agent {
            let mut load = self.agent_load.write().await;
            if let Some(count) = load.get_mut(agent) {
                *count = count.saturating_sub(1);
            }
        }

        let duration_secs = start.elapsed().as_secs();
        let (status, error) = match outcome {
            Ok(Ok(_)) => (ExecutionStatus::Completed, None),
            Ok(Err(err)) => (ExecutionStatus::Failed, Some(err.to_string())),
            Err(_) => (
                ExecutionStatus::Failed,
                Some(format!(
                    "task timed out after {} seconds",
                    self.config.task_timeout_secs
                )),
            ),
        };

        {
            let mut executions = self.executions.write().await;
            if let Some(execution) = executions.get_mut(&task_id) {
                match status {
                    ExecutionStatus::Completed => {
                        let _ = execution.transition_to(ExecutionStatus::Completed);
                    }
                    _ => {
                        let _ = execution
                            .fail(error.clone().unwrap_or_else(|| "unknown error".to_string()));
                    }
                }
            }
        }

        match &status {
            ExecutionStatus::Completed => {
                self.sink
                    .publish(ProgressEvent::TaskCompleted {
                        task_id: task_id.clone(),
                        duration_secs,
                    })
                    .await;
            }
            _ => {
                self.sink
                    .publish(ProgressEvent::TaskFailed {
                        task_id: task_id.clone(),
                        error: error.clone().unwrap_or_default(),
                    })
                    .await;
            }
        }

        TaskRunResult {
            task_id,
            status,
            error,
            duration_secs,
        }
    }

    /// Cancel a queued or running task, releasing its resources.
    pub async fn cancel_task(&self, task_id: &str) -> SchedulerResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        execution
            .transition_to(ExecutionStatus::Cancelled)
            .map_err(|reason| SchedulerError::InvalidStateTransition {
                from: execution.status.as_str().to_string(),
                to: ExecutionStatus::Cancelled.as_str().to_string(),
                reason,
            })?;
        drop(executions);
        self.pool.write().await.release(task_id);
        self.resource_released.notify_waiters();
        Ok(())
    }

    /// Pause a running task. Resource claims are retained.
    pub async fn pause_task(&self, task_id: &str) -> SchedulerResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        execution
            .transition_to(ExecutionStatus::Paused)
            .map_err(|reason| SchedulerError::InvalidStateTransition {
                from: execution.status.as_str().to_string(),
                to: ExecutionStatus::Paused.as_str().to_string(),
                reason,
            })
    }

    /// Resume a paused task.
    pub async fn resume_task(&self, task_id: &str) -> SchedulerResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        execution
            .transition_to(ExecutionStatus::Running)
            .map_err(|reason| SchedulerError::InvalidStateTransition {
                from: execution.status.as_str().to_string(),
                to: ExecutionStatus::Running.as_str().to_string(),
                reason,
            })
    }

    /// The known agent with the fewest in-flight tasks, optionally
    /// excluding one.
    pub async fn least_loaded_agent(&self, exclude: Option<&str>) -> Option<String> {
        let load = self.agent_load.read().await;
        load.iter()
            .filter(|(agent, _)| exclude != Some(agent.as_str()))
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(agent, _)| agent.clone())
    }

    /// Declare an agent so workload balancing can consider it.
    pub async fn register_agent(&self, agent: impl Into<String>) {
        self.agent_load.write().await.entry(agent.into()).or_insert(0);
    }

    /// Split a registered task into `parts` bounded sub-tasks chained
    /// sequentially. The original task is removed from the registry.
    pub async fn split_task(&self, task_id: &str, parts: usize) -> SchedulerResult<Vec<Task>> {
        if parts < 2 {
            return Err(SchedulerError::ValidationFailed(
                "split requires at least 2 parts".to_string(),
            ));
        }
        let original = {
            let mut tasks = self.tasks.write().await;
            tasks
                .remove(task_id)
                .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?
        };
        self.executions.write().await.remove(task_id);

        let chunk = (original.estimated_duration_secs / parts as u64).max(1);
        let mut subtasks = Vec::new();
        for i in 0..parts {
            let mut sub = original.clone();
            sub.id = format!("{}-part{}", original.id, i + 1);
            sub.name = format!("{} (part {}/{})", original.name, i + 1, parts);
            sub.estimated_duration_secs = chunk;
            sub.depends_on = if i == 0 {
                original.depends_on.clone()
            } else {
                vec![format!("{}-part{}", original.id, i)]
            };
            subtasks.push(sub);
        }
        for sub in &subtasks {
            self.add_task(sub.clone()).await?;
        }
        Ok(subtasks)
    }

    /// Execution record snapshot for a task.
    pub async fn execution(&self, task_id: &str) -> Option<TaskExecution> {
        self.executions.read().await.get(task_id).cloned()
    }

    /// Registered task snapshot.
    pub async fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Resource pool utilization snapshot.
    pub async fn utilization(&self) -> Vec<ResourceUtilization> {
        self.pool.read().await.utilization()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FileOp, ResourceRequirement, ResourceType, TaskPriority};
    use crate::domain::ports::AgentOutcome;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct MockExecutor {
        calls: StdMutex<Vec<String>>,
        fail_ids: Vec<String>,
    }

    impl MockExecutor {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                fail_ids: Vec::new(),
            }
        }

        fn failing(ids: &[&str]) -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                fail_ids: ids.iter().map(|s| (*s).to_string()).collect(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentExecutor for MockExecutor {
        async fn execute(&self, task: &Task) -> anyhow::Result<AgentOutcome> {
            self.calls.lock().unwrap().push(task.id.clone());
            if self.fail_ids.contains(&task.id) {
                bail!("simulated failure in {}", task.id);
            }
            Ok(AgentOutcome::empty())
        }
    }

    async fn manager_with(executor: Arc<MockExecutor>) -> ParallelTaskManager {
        let manager = ParallelTaskManager::new(SchedulerConfig::default(), executor);
        manager
            .register_resource(Resource::new("cpu", ResourceType::Cpu, 4))
            .await;
        manager
            .register_resource(Resource::new("staging-db", ResourceType::Database, 1).exclusive())
            .await;
        manager
    }

    fn cpu_task(id: &str) -> Task {
        Task::new(id, id).with_resource(ResourceRequirement::new(ResourceType::Cpu, "cpu", 1))
    }

    async fn force_running(manager: &ParallelTaskManager, task_id: &str) {
        let mut executions = manager.executions.write().await;
        let execution = executions.get_mut(task_id).unwrap();
        execution.transition_to(ExecutionStatus::Running).unwrap();
    }

    #[tokio::test]
    async fn test_add_task_rejects_invalid() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        let task = Task::new("t1", " ")
            .with_resource(ResourceRequirement::new(ResourceType::Cpu, "cpu", 1));
        assert!(matches!(
            manager.add_task(task).await,
            Err(SchedulerError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_add_task_rejects_cycle() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager.add_task(cpu_task("a")).await.unwrap();
        manager
            .add_task(cpu_task("b").with_dependency("a"))
            .await
            .unwrap();
        // Re-admitting a with a dependency on b closes the loop
        let looped = cpu_task("a").with_dependency("b");
        match manager.add_task(looped).await {
            Err(SchedulerError::DependencyCycle(path)) => {
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
            }
            other => panic!("expected dependency cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_task_rejects_wide_critical_collision() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager
            .add_task(cpu_task("t1").with_file("src/old.rs", FileOp::Delete))
            .await
            .unwrap();
        force_running(&manager, "t1").await;
        manager
            .add_task(cpu_task("t2").with_file("src/old.rs", FileOp::Read))
            .await
            .unwrap();
        // Upgrade t2 to a modifier and mark it running to widen the pair
        manager.tasks.write().await.get_mut("t2").unwrap().files =
            vec![crate::domain::models::FileAccess::new("src/old.rs", FileOp::Modify)];
        force_running(&manager, "t2").await;

        let candidate = cpu_task("t3").with_file("src/old.rs", FileOp::Create);
        assert!(matches!(
            manager.add_task(candidate).await,
            Err(SchedulerError::CriticalCollision { .. })
        ));
    }

    #[tokio::test]
    async fn test_serialize_mitigation_injects_dependency() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager
            .add_task(cpu_task("t1").with_file("src/lib.rs", FileOp::Modify))
            .await
            .unwrap();
        force_running(&manager, "t1").await;

        let report = manager
            .add_task(cpu_task("t2").with_file("src/lib.rs", FileOp::Modify))
            .await
            .unwrap();
        assert_eq!(report.risk, CollisionRisk::High);
        assert!(report.require_serialization);
        let stored = manager.task("t2").await.unwrap();
        assert!(stored.depends_on.contains(&"t1".to_string()));
    }

    #[tokio::test]
    async fn test_reschedule_mitigation_sets_delay() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager
            .add_task(cpu_task("t1").with_file("src/new.rs", FileOp::Create))
            .await
            .unwrap();
        force_running(&manager, "t1").await;

        let report = manager
            .add_task(cpu_task("t2").with_file("src/new.rs", FileOp::Create))
            .await
            .unwrap();
        assert_eq!(report.risk, CollisionRisk::Medium);
        let execution = manager.execution("t2").await.unwrap();
        assert_eq!(execution.scheduled_delay_secs, 60);
    }

    #[tokio::test]
    async fn test_execute_parallel_orders_dependencies() {
        let executor = Arc::new(MockExecutor::new());
        let manager = manager_with(Arc::clone(&executor)).await;
        manager.add_task(cpu_task("a")).await.unwrap();
        manager
            .add_task(cpu_task("b").with_dependency("a"))
            .await
            .unwrap();

        let report = manager
            .execute_parallel(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.batches, vec![vec!["a".to_string()], vec!["b".to_string()]]);
        assert_eq!(executor.calls(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let executor = Arc::new(MockExecutor::failing(&["bad"]));
        let manager = manager_with(Arc::clone(&executor)).await;
        manager.add_task(cpu_task("bad")).await.unwrap();
        manager.add_task(cpu_task("good")).await.unwrap();

        let report = manager
            .execute_parallel(&["bad".to_string(), "good".to_string()])
            .await
            .unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(executor.calls().len(), 2);
        let good = manager.execution("good").await.unwrap();
        assert_eq!(good.status, ExecutionStatus::Completed);
        let bad = manager.execution("bad").await.unwrap();
        assert_eq!(bad.status, ExecutionStatus::Failed);
        assert!(bad.error.is_some());
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependent() {
        let executor = Arc::new(MockExecutor::failing(&["t1"]));
        let manager = manager_with(Arc::clone(&executor)).await;
        manager.add_task(cpu_task("t1")).await.unwrap();
        manager
            .add_task(cpu_task("t2").with_dependency("t1"))
            .await
            .unwrap();

        manager.execute_parallel(&["t1".to_string()]).await.unwrap();
        let report = manager.execute_parallel(&["t2".to_string()]).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.completed, 0);
        let execution = manager.execution("t2").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Cancelled);
        // The executor never saw t2
        assert_eq!(executor.calls(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_resources_released_after_settlement() {
        let executor = Arc::new(MockExecutor::failing(&["bad"]));
        let manager = manager_with(executor).await;
        manager.add_task(cpu_task("good")).await.unwrap();
        manager.add_task(cpu_task("bad")).await.unwrap();
        manager
            .execute_parallel(&["good".to_string(), "bad".to_string()])
            .await
            .unwrap();

        let utilization = manager.utilization().await;
        let cpu = utilization.iter().find(|u| u.name == "cpu").unwrap();
        assert_eq!(cpu.in_use, 0);
    }

    #[tokio::test]
    async fn test_exclusive_resource_splits_batches() {
        let executor = Arc::new(MockExecutor::new());
        let manager = manager_with(Arc::clone(&executor)).await;
        let db_task = |id: &str| {
            Task::new(id, id).with_resource(ResourceRequirement::new(
                ResourceType::Database,
                "staging-db",
                1,
            ))
        };
        manager.add_task(db_task("t1")).await.unwrap();
        manager.add_task(db_task("t2")).await.unwrap();

        let report = manager
            .execute_parallel(&["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.batches.len(), 2);
    }

    #[tokio::test]
    async fn test_priority_orders_admission() {
        let executor = Arc::new(MockExecutor::new());
        let manager = manager_with(Arc::clone(&executor)).await;
        // Five single-cpu tasks against capacity 4: the background task
        // must be the one deferred to the second batch.
        for id in ["a", "b", "c", "d"] {
            manager
                .add_task(cpu_task(id).with_priority(TaskPriority::High))
                .await
                .unwrap();
        }
        manager
            .add_task(cpu_task("z").with_priority(TaskPriority::Background))
            .await
            .unwrap();

        let ids: Vec<String> = ["a", "b", "c", "d", "z"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let report = manager.execute_parallel(&ids).await.unwrap();
        assert_eq!(report.batches.len(), 2);
        assert_eq!(report.batches[1], vec!["z".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager.add_task(cpu_task("t1")).await.unwrap();
        manager.cancel_task("t1").await.unwrap();
        let execution = manager.execution("t1").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Cancelled);

        // A settled task cannot be cancelled again
        assert!(matches!(
            manager.cancel_task("t1").await,
            Err(SchedulerError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            manager.cancel_task("ghost").await,
            Err(SchedulerError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_split_task_chains_parts() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager
            .add_task(cpu_task("big").with_duration(900))
            .await
            .unwrap();
        let parts = manager.split_task("big", 3).await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].estimated_duration_secs, 300);
        assert!(parts[1].depends_on.contains(&"big-part1".to_string()));
        assert!(parts[2].depends_on.contains(&"big-part2".to_string()));
        assert!(manager.task("big").await.is_none());
        assert!(manager.task("big-part2").await.is_some());
    }

    #[tokio::test]
    async fn test_dependency_failure_skips_dependent_in_same_call() {
        let executor = Arc::new(MockExecutor::failing(&["a"]));
        let manager = manager_with(Arc::clone(&executor)).await;
        manager.add_task(cpu_task("a")).await.unwrap();
        manager
            .add_task(cpu_task("b").with_dependency("a"))
            .await
            .unwrap();

        let report = manager
            .execute_parallel(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.completed, 0);
        // b's batch never dispatched
        assert_eq!(report.batches, vec![vec!["a".to_string()]]);
        assert_eq!(executor.calls(), vec!["a".to_string()]);
        let b = manager.execution("b").await.unwrap();
        assert_eq!(b.status, ExecutionStatus::Cancelled);
        assert_eq!(b.error.as_deref(), Some("unmet dependency"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_delay_defers_dispatch() {
        let executor = Arc::new(MockExecutor::new());
        let manager = manager_with(Arc::clone(&executor)).await;
        manager
            .add_task(cpu_task("t1").with_file("src/new.rs", FileOp::Create))
            .await
            .unwrap();
        force_running(&manager, "t1").await;
        manager
            .add_task(cpu_task("t2").with_file("src/new.rs", FileOp::Create))
            .await
            .unwrap();
        assert_eq!(manager.execution("t2").await.unwrap().scheduled_delay_secs, 60);

        let before = tokio::time::Instant::now();
        let report = manager.execute_parallel(&["t2".to_string()]).await.unwrap();
        assert_eq!(report.completed, 1);
        // The full reschedule delay elapses before the executor runs
        assert!(before.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_held_resources() {
        let executor = Arc::new(MockExecutor::new());
        let manager = Arc::new(manager_with(Arc::clone(&executor)).await);
        let db_task = |id: &str| {
            Task::new(id, id).with_resource(ResourceRequirement::new(
                ResourceType::Database,
                "staging-db",
                1,
            ))
        };
        // An outside holder occupies the exclusive resource.
        let holder = db_task("holder");
        manager.pool.write().await.allocate(&holder).unwrap();

        manager.add_task(db_task("waiter")).await.unwrap();
        let runner = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.execute_parallel(&["waiter".to_string()]).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(executor.calls().is_empty());
        let waiting = manager.execution("waiter").await.unwrap();
        assert_eq!(waiting.status, ExecutionStatus::Queued);

        manager.pool.write().await.release("holder");
        manager.resource_released.notify_waiters();

        let report = runner.await.unwrap().unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(executor.calls(), vec!["waiter".to_string()]);
    }

    #[tokio::test]
    async fn test_reschedule_reassigns_contended_agent() {
        let manager = manager_with(Arc::new(MockExecutor::new())).await;
        manager.register_agent("alpha").await;
        manager.register_agent("beta").await;
        manager
            .add_task(
                cpu_task("t1")
                    .with_file("src/new.rs", FileOp::Create)
                    .with_agent("alpha"),
            )
            .await
            .unwrap();
        force_running(&manager, "t1").await;

        let report = manager
            .add_task(
                cpu_task("t2")
                    .with_file("src/new.rs", FileOp::Create)
                    .with_agent("alpha"),
            )
            .await
            .unwrap();
        assert_eq!(report.strategy, ResolutionStrategy::Reschedule);
        // t2 moves off the contended agent; the delay still applies
        let stored = manager.task("t2").await.unwrap();
        assert_eq!(stored.assigned_agent.as_deref(), Some("beta"));
        assert_eq!(manager.execution("t2").await.unwrap().scheduled_delay_secs, 60);
    }

    #[tokio::test]
    async fn test_sequential_execution_order() {
        let executor = Arc::new(MockExecutor::new());
        let manager = manager_with(Arc::clone(&executor)).await;
        manager.add_task(cpu_task("t1")).await.unwrap();
        manager.add_task(cpu_task("t2")).await.unwrap();
        let report = manager
            .execute_sequential(&["t2".to_string(), "t1".to_string()])
            .await
            .unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(executor.calls(), vec!["t2".to_string(), "t1".to_string()]);
    }
}
