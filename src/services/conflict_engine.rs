//! Conflict resolution engine.
//!
//! A stateful registry of in-flight sub-agents plus a file -> holder
//! lock map. Registration runs collision detection against running
//! agents and applies a severity-keyed resolution; a periodic
//! reconciliation pass releases locks, promotes unblocked agents, and
//! evicts completed ones. Every resolution is appended to a pattern
//! log for future historical-similarity lookups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{
    AgentStatus, CollisionRisk, ConflictResolution, ResolutionPattern, ResolutionStrategy,
    SchedulerConfig, SubAgent,
};
use crate::domain::ports::{NullProgressSink, PatternStore, ProgressEvent, ProgressSink};
use crate::services::collision_detector::{CollisionDetector, TaskFileSet};

/// Namespace used for conflict pattern lookups.
const CONFLICT_NAMESPACE: &str = "conflict";

/// Stateful conflict resolution engine.
pub struct ConflictEngine {
    detector: CollisionDetector,
    config: SchedulerConfig,
    pattern_store: Arc<dyn PatternStore>,
    sink: Arc<dyn ProgressSink>,
    agents: RwLock<HashMap<Uuid, SubAgent>>,
    file_locks: RwLock<HashMap<String, Uuid>>,
    patterns: RwLock<Vec<ResolutionPattern>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConflictEngine {
    pub fn new(config: SchedulerConfig, pattern_store: Arc<dyn PatternStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            detector: CollisionDetector::new(),
            config,
            pattern_store,
            sink: Arc::new(NullProgressSink),
            agents: RwLock::new(HashMap::new()),
            file_locks: RwLock::new(HashMap::new()),
            patterns: RwLock::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Attach a progress sink for watch notifications.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a new sub-agent, resolving any conflicts with running
    /// agents. Returns the resolutions applied.
    pub async fn register_agent(
        &self,
        mut agent: SubAgent,
    ) -> SchedulerResult<Vec<ConflictResolution>> {
        let mut resolutions = Vec::new();

        // Unmet task dependencies block before any file analysis.
        {
            let agents = self.agents.read().await;
            let unmet: Vec<Uuid> = agent
                .depends_on
                .iter()
                .filter(|dep| {
                    agents
                        .get(dep)
                        .is_some_and(|a| a.status != AgentStatus::Completed)
                })
                .copied()
                .collect();
            if !unmet.is_empty() {
                agent.status = AgentStatus::Blocked;
                resolutions.push(ConflictResolution {
                    strategy: ResolutionStrategy::Serialize,
                    winner: None,
                    blocked: vec![agent.id.to_string()],
                    estimated_delay_secs: 0,
                    reasoning: format!("{} unmet dependencies", unmet.len()),
                    auto_apply: true,
                });
            }
        }

        if agent.status != AgentStatus::Blocked {
            let running: Vec<SubAgent> = {
                let agents = self.agents.read().await;
                agents
                    .values()
                    .filter(|a| a.status == AgentStatus::Running)
                    .cloned()
                    .collect()
            };

            for other in running {
                let severity = self.pair_severity(&agent, &other).await;
                if severity == CollisionRisk::None {
                    continue;
                }
                let resolution = self.resolve_pair(&mut agent, &other, severity).await;
                self.record_pattern(&agent, &other, severity, &resolution)
                    .await;
                resolutions.push(resolution);
                if agent.status == AgentStatus::Blocked {
                    break;
                }
            }
        }

        if agent.status != AgentStatus::Blocked {
            agent.status = AgentStatus::Running;
            // High-priority agents take exclusive locks on their files.
            if agent.priority >= self.config.lock_priority_threshold {
                let mut locks = self.file_locks.write().await;
                for path in agent.paths() {
                    locks.entry(path.to_string()).or_insert(agent.id);
                }
            }
        }

        debug!(
            agent_id = %agent.id,
            task_id = %agent.task_id,
            status = agent.status.as_str(),
            resolutions = resolutions.len(),
            "agent registered"
        );
        self.agents.write().await.insert(agent.id, agent);
        Ok(resolutions)
    }

    /// Severity of the overlap between two agents' file sets.
    ///
    /// An overlap touching a locked file, or involving an agent above
    /// the lock threshold with write contention, is exclusive-lock
    /// contention and escalates to critical.
    async fn pair_severity(&self, a: &SubAgent, b: &SubAgent) -> CollisionRisk {
        let report = self
            .detector
            .detect(&[TaskFileSet::from(a), TaskFileSet::from(b)]);
        if !report.has_collision {
            // Still check lock contention: locked files conflict even
            // when the op mix alone would be safe.
            let locks = self.file_locks.read().await;
            let touches_foreign_lock = a
                .paths()
                .any(|p| locks.get(p).is_some_and(|holder| *holder != a.id));
            if touches_foreign_lock {
                return CollisionRisk::Critical;
            }
            return CollisionRisk::None;
        }

        let locks = self.file_locks.read().await;
        let contends_lock = report
            .conflicts
            .iter()
            .any(|c| locks.get(&c.path).is_some_and(|holder| *holder != a.id));
        let threshold = self.config.lock_priority_threshold;
        let lock_party = a.priority >= threshold || b.priority >= threshold;
        if report.risk >= CollisionRisk::Medium && (contends_lock || lock_party) {
            return CollisionRisk::Critical;
        }
        report.risk
    }

    /// Apply the severity-keyed resolution for one conflicting pair.
    async fn resolve_pair(
        &self,
        incoming: &mut SubAgent,
        running: &SubAgent,
        severity: CollisionRisk,
    ) -> ConflictResolution {
        match severity {
            CollisionRisk::Critical => self.priority_wins(incoming, running).await,
            CollisionRisk::High => {
                // The earlier-started agent proceeds; the running agent
                // always started first.
                incoming.status = AgentStatus::Blocked;
                incoming.depends_on.push(running.id);
                ConflictResolution {
                    strategy: ResolutionStrategy::Serialize,
                    winner: Some(running.id.to_string()),
                    blocked: vec![incoming.id.to_string()],
                    estimated_delay_secs: 0,
                    reasoning: format!(
                        "high-severity overlap; serialized behind earlier agent {}",
                        running.id
                    ),
                    auto_apply: true,
                }
            }
            CollisionRisk::Medium => {
                let paths: Vec<String> = incoming.paths().map(str::to_string).collect();
                let query = paths.join(" ");
                let pattern = self
                    .pattern_store
                    .query_similar(&query, CONFLICT_NAMESPACE, 1)
                    .await
                    .ok()
                    .and_then(|m| m.into_iter().next());

                match pattern {
                    Some(best) if best.similarity > self.config.pattern_similarity_threshold => {
                        // Strong precedent: auto-apply its outcome. A
                        // merge precedent lets both proceed; anything
                        // else serializes the newcomer.
                        let merge = best
                            .metadata
                            .get("strategy")
                            .and_then(|s| s.as_str())
                            .is_some_and(|s| s == "merge" || s == "allow_parallel");
                        if merge {
                            ConflictResolution {
                                strategy: ResolutionStrategy::Merge,
                                winner: None,
                                blocked: Vec::new(),
                                estimated_delay_secs: 0,
                                reasoning: format!(
                                    "historical pattern (similarity {:.2}) allows merge",
                                    best.similarity
                                ),
                                auto_apply: true,
                            }
                        } else {
                            incoming.status = AgentStatus::Blocked;
                            incoming.depends_on.push(running.id);
                            ConflictResolution {
                                strategy: ResolutionStrategy::Serialize,
                                winner: Some(running.id.to_string()),
                                blocked: vec![incoming.id.to_string()],
                                estimated_delay_secs: 0,
                                reasoning: format!(
                                    "historical pattern (similarity {:.2}) serialized",
                                    best.similarity
                                ),
                                auto_apply: true,
                            }
                        }
                    }
                    _ => self.priority_wins(incoming, running).await,
                }
            }
            CollisionRisk::Low => {
                // Merge: both proceed; emit a watch for monitoring.
                // Deliberate throughput/safety tradeoff, no enforced
                // mutual exclusion.
                let shared: Vec<String> = incoming
                    .paths()
                    .filter(|p| running.paths().any(|q| q == *p))
                    .map(str::to_string)
                    .collect();
                for path in &shared {
                    self.sink
                        .publish(ProgressEvent::ConflictWatch {
                            path: path.clone(),
                            task_ids: vec![incoming.task_id.clone(), running.task_id.clone()],
                        })
                        .await;
                }
                ConflictResolution {
                    strategy: ResolutionStrategy::Merge,
                    winner: None,
                    blocked: Vec::new(),
                    estimated_delay_secs: 0,
                    reasoning: "low severity; both proceed under watch".to_string(),
                    auto_apply: true,
                }
            }
            CollisionRisk::None => ConflictResolution {
                strategy: ResolutionStrategy::AllowParallel,
                winner: None,
                blocked: Vec::new(),
                estimated_delay_secs: 0,
                reasoning: "no conflict".to_string(),
                auto_apply: true,
            },
        }
    }

    /// The higher-priority agent proceeds; the other is blocked and
    /// gains a synthetic dependency on the winner.
    async fn priority_wins(
        &self,
        incoming: &mut SubAgent,
        running: &SubAgent,
    ) -> ConflictResolution {
        if incoming.priority > running.priority {
            // Block the running agent in the registry.
            let mut agents = self.agents.write().await;
            if let Some(loser) = agents.get_mut(&running.id) {
                loser.status = AgentStatus::Blocked;
                loser.depends_on.push(incoming.id);
            }
            ConflictResolution {
                strategy: ResolutionStrategy::PriorityWins,
                winner: Some(incoming.id.to_string()),
                blocked: vec![running.id.to_string()],
                estimated_delay_secs: 0,
                reasoning: format!(
                    "priority {:.1} beats {:.1}",
                    incoming.priority, running.priority
                ),
                auto_apply: true,
            }
        } else {
            incoming.status = AgentStatus::Blocked;
            incoming.depends_on.push(running.id);
            ConflictResolution {
                strategy: ResolutionStrategy::PriorityWins,
                winner: Some(running.id.to_string()),
                blocked: vec![incoming.id.to_string()],
                estimated_delay_secs: 0,
                reasoning: format!(
                    "priority {:.1} beats {:.1}",
                    running.priority, incoming.priority
                ),
                auto_apply: true,
            }
        }
    }

    /// Append a resolution to the pattern log and the external store.
    /// The store write is best-effort.
    async fn record_pattern(
        &self,
        a: &SubAgent,
        b: &SubAgent,
        severity: CollisionRisk,
        resolution: &ConflictResolution,
    ) {
        let paths: Vec<String> = a
            .paths()
            .filter(|p| b.paths().any(|q| q == *p))
            .map(str::to_string)
            .collect();
        let pattern = ResolutionPattern {
            paths: paths.clone(),
            severity,
            strategy: resolution.strategy,
            outcome: resolution.reasoning.clone(),
            resolved_at: chrono::Utc::now(),
        };
        self.patterns.write().await.push(pattern);

        let metadata = serde_json::json!({
            "strategy": resolution.strategy.as_str(),
            "severity": severity.as_str(),
        });
        if let Err(err) = self
            .pattern_store
            .store(&paths.join(" "), CONFLICT_NAMESPACE, metadata)
            .await
        {
            debug!(%err, "pattern store write failed");
        }
    }

    /// Mark an agent completed. Locks are released by the next
    /// reconciliation pass, together with eviction.
    pub async fn complete_agent(&self, agent_id: Uuid) -> SchedulerResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or(SchedulerError::AgentNotFound(agent_id))?;
        agent.status = AgentStatus::Completed;
        Ok(())
    }

    /// Mark an agent failed.
    pub async fn fail_agent(&self, agent_id: Uuid) -> SchedulerResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or(SchedulerError::AgentNotFound(agent_id))?;
        agent.status = AgentStatus::Failed;
        Ok(())
    }

    /// One reconciliation pass: release completed agents' locks,
    /// promote unblocked agents back through registration, and evict
    /// the completed agents. Returns the evicted ids.
    pub async fn reconcile(&self) -> SchedulerResult<Vec<Uuid>> {
        let completed: Vec<Uuid> = {
            let agents = self.agents.read().await;
            agents
                .values()
                .filter(|a| a.status == AgentStatus::Completed)
                .map(|a| a.id)
                .collect()
        };

        {
            let mut locks = self.file_locks.write().await;
            locks.retain(|_, holder| !completed.contains(holder));
        }

        // Evict before promotion so satisfied dependencies read as
        // absent during re-registration.
        {
            let mut agents = self.agents.write().await;
            for id in &completed {
                agents.remove(id);
            }
        }

        let promotable: Vec<SubAgent> = {
            let agents = self.agents.read().await;
            agents
                .values()
                .filter(|a| {
                    a.status == AgentStatus::Blocked
                        && a.depends_on.iter().all(|dep| {
                            agents
                                .get(dep)
                                .is_none_or(|d| d.status == AgentStatus::Completed)
                        })
                })
                .cloned()
                .collect()
        };

        for mut agent in promotable {
            {
                let mut agents = self.agents.write().await;
                agents.remove(&agent.id);
            }
            agent.status = AgentStatus::Pending;
            // Satisfied dependencies read as absent after eviction.
            {
                let agents = self.agents.read().await;
                agent.depends_on.retain(|dep| agents.contains_key(dep));
            }
            let _ = self.register_agent(agent).await?;
        }

        Ok(completed)
    }

    /// Spawn the periodic reconciliation loop. Stops on `shutdown`.
    pub fn spawn_reconciler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(engine.config.reconcile_interval_secs);
        tokio::spawn(async move {
            let mut tick = interval(period);
            info!(period_secs = period.as_secs(), "conflict reconciler started");
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(err) = engine.reconcile().await {
                            warn!(%err, "reconciliation pass failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("conflict reconciler stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Signal the reconciler loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Snapshot of an agent by id.
    pub async fn agent(&self, agent_id: Uuid) -> Option<SubAgent> {
        self.agents.read().await.get(&agent_id).cloned()
    }

    /// All agents currently in a given status.
    pub async fn agents_with_status(&self, status: AgentStatus) -> Vec<SubAgent> {
        self.agents
            .read()
            .await
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect()
    }

    /// Current file lock holders.
    pub async fn locks(&self) -> HashMap<String, Uuid> {
        self.file_locks.read().await.clone()
    }

    /// Append-only log of recorded resolutions.
    pub async fn resolution_log(&self) -> Vec<ResolutionPattern> {
        self.patterns.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentRole, FileOp};
    use crate::domain::ports::{NullPatternStore, PatternMatch};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct CaptureSink {
        events: StdMutex<Vec<ProgressEvent>>,
    }

    impl CaptureSink {
        fn new() -> Self {
            Self {
                events: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProgressSink for CaptureSink {
        async fn publish(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct MergePatternStore;

    #[async_trait]
    impl PatternStore for MergePatternStore {
        async fn query_similar(
            &self,
            _query: &str,
            _namespace: &str,
            _limit: usize,
        ) -> Result<Vec<PatternMatch>> {
            Ok(vec![PatternMatch {
                similarity: 0.92,
                metadata: serde_json::json!({"strategy": "merge"}),
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

    fn engine() -> ConflictEngine {
        ConflictEngine::new(SchedulerConfig::default(), Arc::new(NullPatternStore))
    }

    fn writer(task: &str, priority: f64, path: &str) -> SubAgent {
        SubAgent::new(AgentRole::Coder, task, priority).with_file(path, FileOp::Modify)
    }

    #[tokio::test]
    async fn test_high_priority_writer_never_blocked_registering_second() {
        let engine = engine();
        let low = writer("t-low", 3.0, "src/lib.rs");
        let high = writer("t-high", 9.0, "src/lib.rs");
        let high_id = high.id;
        let low_id = low.id;

        engine.register_agent(low).await.unwrap();
        engine.register_agent(high).await.unwrap();

        let high = engine.agent(high_id).await.unwrap();
        assert_ne!(high.status, AgentStatus::Blocked);
        let low = engine.agent(low_id).await.unwrap();
        assert_eq!(low.status, AgentStatus::Blocked);
    }

    #[tokio::test]
    async fn test_high_priority_writer_never_blocked_registering_first() {
        let engine = engine();
        let high = writer("t-high", 9.0, "src/lib.rs");
        let low = writer("t-low", 3.0, "src/lib.rs");
        let high_id = high.id;
        let low_id = low.id;

        engine.register_agent(high).await.unwrap();
        engine.register_agent(low).await.unwrap();

        let high = engine.agent(high_id).await.unwrap();
        assert_ne!(high.status, AgentStatus::Blocked);
        let low = engine.agent(low_id).await.unwrap();
        assert_eq!(low.status, AgentStatus::Blocked);
    }

    #[tokio::test]
    async fn test_lock_acquisition_above_threshold() {
        let engine = engine();
        let agent = writer("t1", 8.0, "src/main.rs");
        let id = agent.id;
        engine.register_agent(agent).await.unwrap();

        let locks = engine.locks().await;
        assert_eq!(locks.get("src/main.rs"), Some(&id));
    }

    #[tokio::test]
    async fn test_no_lock_below_threshold() {
        let engine = engine();
        engine
            .register_agent(writer("t1", 5.0, "src/main.rs"))
            .await
            .unwrap();
        assert!(engine.locks().await.is_empty());
    }

    #[tokio::test]
    async fn test_serialize_blocks_later_writer_same_tier() {
        let engine = engine();
        let first = writer("t1", 5.0, "src/lib.rs");
        let second = writer("t2", 5.0, "src/lib.rs");
        let first_id = first.id;
        let second_id = second.id;

        engine.register_agent(first).await.unwrap();
        let resolutions = engine.register_agent(second).await.unwrap();

        // Equal priority, high severity: earlier-started proceeds.
        assert_eq!(
            engine.agent(first_id).await.unwrap().status,
            AgentStatus::Running
        );
        let second = engine.agent(second_id).await.unwrap();
        assert_eq!(second.status, AgentStatus::Blocked);
        assert!(second.depends_on.contains(&first_id));
        assert!(!resolutions.is_empty());
    }

    #[tokio::test]
    async fn test_low_severity_merge_emits_watch() {
        let sink = Arc::new(CaptureSink::new());
        let engine = ConflictEngine::new(SchedulerConfig::default(), Arc::new(NullPatternStore))
            .with_sink(sink.clone());

        let reader = SubAgent::new(AgentRole::Reviewer, "t1", 4.0).with_file("a.rs", FileOp::Read);
        let writer = SubAgent::new(AgentRole::Coder, "t2", 4.0).with_file("a.rs", FileOp::Modify);
        let reader_id = reader.id;
        let writer_id = writer.id;

        engine.register_agent(reader).await.unwrap();
        engine.register_agent(writer).await.unwrap();

        // Both proceed: merge is not upgraded to serialization.
        assert_eq!(
            engine.agent(reader_id).await.unwrap().status,
            AgentStatus::Running
        );
        assert_eq!(
            engine.agent(writer_id).await.unwrap().status,
            AgentStatus::Running
        );

        let events = sink.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::ConflictWatch { path, .. } if path == "a.rs")));
    }

    #[tokio::test]
    async fn test_medium_severity_pattern_auto_apply() {
        let engine =
            ConflictEngine::new(SchedulerConfig::default(), Arc::new(MergePatternStore));

        let first = SubAgent::new(AgentRole::Coder, "t1", 4.0).with_file("new.rs", FileOp::Create);
        let second = SubAgent::new(AgentRole::Coder, "t2", 4.0).with_file("new.rs", FileOp::Create);
        let second_id = second.id;

        engine.register_agent(first).await.unwrap();
        let resolutions = engine.register_agent(second).await.unwrap();

        assert_eq!(
            engine.agent(second_id).await.unwrap().status,
            AgentStatus::Running
        );
        assert!(resolutions
            .iter()
            .any(|r| r.strategy == ResolutionStrategy::Merge && r.auto_apply));
    }

    #[tokio::test]
    async fn test_unmet_dependency_blocks() {
        let engine = engine();
        let dep = writer("t1", 5.0, "a.rs");
        let dep_id = dep.id;
        engine.register_agent(dep).await.unwrap();

        let mut dependent = writer("t2", 5.0, "b.rs");
        dependent.depends_on.push(dep_id);
        let dependent_id = dependent.id;
        engine.register_agent(dependent).await.unwrap();

        assert_eq!(
            engine.agent(dependent_id).await.unwrap().status,
            AgentStatus::Blocked
        );
    }

    #[tokio::test]
    async fn test_reconcile_releases_locks_and_promotes() {
        let engine = engine();
        let winner = writer("t1", 9.0, "src/lib.rs");
        let winner_id = winner.id;
        engine.register_agent(winner).await.unwrap();

        let loser = writer("t2", 3.0, "src/lib.rs");
        let loser_id = loser.id;
        engine.register_agent(loser).await.unwrap();
        assert_eq!(
            engine.agent(loser_id).await.unwrap().status,
            AgentStatus::Blocked
        );

        engine.complete_agent(winner_id).await.unwrap();
        let evicted = engine.reconcile().await.unwrap();
        assert_eq!(evicted, vec![winner_id]);

        // Winner evicted, lock released, loser promoted to running.
        assert!(engine.agent(winner_id).await.is_none());
        assert!(engine.locks().await.is_empty());
        assert_eq!(
            engine.agent(loser_id).await.unwrap().status,
            AgentStatus::Running
        );
    }

    #[tokio::test]
    async fn test_resolution_log_is_append_only() {
        let engine = engine();
        engine
            .register_agent(writer("t1", 5.0, "src/lib.rs"))
            .await
            .unwrap();
        engine
            .register_agent(writer("t2", 5.0, "src/lib.rs"))
            .await
            .unwrap();
        let log = engine.resolution_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].strategy, ResolutionStrategy::Serialize);
    }

    #[tokio::test]
    async fn test_reconciler_loop_shutdown() {
        let engine = Arc::new(engine());
        let handle = engine.spawn_reconciler();
        engine.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reconciler did not stop")
            .expect("reconciler panicked");
    }
}
