//! Event-driven handoff dispatching.
//!
//! Completions drive everything: when an agent finishes, its chains
//! advance immediately and the pending queue gets a scheduling tick.
//! There is no polling loop over agent state. Urgent and high handoffs
//! drain the moment they are submitted; medium and low wait for the
//! next tick.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{AgentChain, ChainStatus, HandoffRequest, SchedulerConfig};
use crate::domain::ports::{NullProgressSink, ProgressEvent, ProgressSink};

/// A completed unit of agent work.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    pub agent: String,
    pub task_id: String,
    pub success: bool,
}

/// Queue entry: priority tier first, then submission order within the
/// tier (stable FIFO).
struct QueuedHandoff {
    request: HandoffRequest,
    seq: u64,
    enqueued_at: Instant,
}

impl PartialEq for QueuedHandoff {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedHandoff {}

impl Ord for QueuedHandoff {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins; older submission wins a tie.
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedHandoff {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dispatcher metrics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffMetrics {
    pub processed: usize,
    pub failed_completions: usize,
    pub queue_depth: usize,
    /// Mean latency over the rolling window, milliseconds
    pub average_latency_ms: f64,
    /// Completions that succeeded over all completions observed
    pub success_rate: f64,
}

/// Event-driven handoff dispatcher.
pub struct HandoffDispatcher {
    config: SchedulerConfig,
    sink: Arc<dyn ProgressSink>,
    chains: RwLock<HashMap<String, AgentChain>>,
    queue: Mutex<BinaryHeap<QueuedHandoff>>,
    latencies: Mutex<VecDeque<f64>>,
    seq: AtomicU64,
    processed: AtomicUsize,
    completions_ok: AtomicUsize,
    completions_failed: AtomicUsize,
    tx: mpsc::UnboundedSender<CompletionSignal>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<CompletionSignal>>>,
}

impl HandoffDispatcher {
    pub fn new(config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            sink: Arc::new(NullProgressSink),
            chains: RwLock::new(HashMap::new()),
            queue: Mutex::new(BinaryHeap::new()),
            latencies: Mutex::new(VecDeque::new()),
            seq: AtomicU64::new(0),
            processed: AtomicUsize::new(0),
            completions_ok: AtomicUsize::new(0),
            completions_failed: AtomicUsize::new(0),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Attach a progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sender side of the completion channel, for decoupled producers.
    pub fn completion_sender(&self) -> mpsc::UnboundedSender<CompletionSignal> {
        self.tx.clone()
    }

    /// Register a pre-declared chain. Replaces any chain with the same
    /// name.
    pub async fn register_chain(&self, chain: AgentChain) {
        self.chains.write().await.insert(chain.name.clone(), chain);
    }

    /// Activate a chain from its first agent.
    pub async fn start_chain(&self, name: &str) -> SchedulerResult<String> {
        let mut chains = self.chains.write().await;
        let chain = chains
            .get_mut(name)
            .ok_or_else(|| SchedulerError::ChainNotFound(name.to_string()))?;
        chain.position = 0;
        chain.status = ChainStatus::Active;
        let agent = chain
            .current_agent()
            .map(str::to_string)
            .ok_or_else(|| SchedulerError::ValidationFailed(format!("chain {name} is empty")))?;
        drop(chains);

        info!(chain = name, agent = %agent, "chain started");
        self.sink
            .publish(ProgressEvent::ChainStarted {
                chain: name.to_string(),
                agent: agent.clone(),
            })
            .await;
        Ok(agent)
    }

    /// Chain snapshot by name.
    pub async fn chain(&self, name: &str) -> Option<AgentChain> {
        self.chains.read().await.get(name).cloned()
    }

    /// React to a completed unit of agent work: advance any chain the
    /// agent currently heads, then give the pending queue a tick.
    pub async fn signal_completion(&self, signal: CompletionSignal) {
        if signal.success {
            self.completions_ok.fetch_add(1, AtomicOrdering::Relaxed);
        } else {
            self.completions_failed.fetch_add(1, AtomicOrdering::Relaxed);
            // Degrade gracefully: the chain still advances so one bad
            // handoff cannot wedge the pipeline.
            warn!(
                agent = %signal.agent,
                task_id = %signal.task_id,
                "agent completed unsuccessfully, advancing anyway"
            );
        }

        let mut advanced = Vec::new();
        let mut completed = Vec::new();
        {
            let mut chains = self.chains.write().await;
            for chain in chains.values_mut() {
                if chain.current_agent() != Some(signal.agent.as_str()) {
                    continue;
                }
                let name = chain.name.clone();
                match chain.advance() {
                    Some(next) => advanced.push((name, next.to_string())),
                    None => completed.push(name),
                }
            }
        }

        for (chain, agent) in advanced {
            debug!(chain = %chain, agent = %agent, "chain advanced");
            self.sink
                .publish(ProgressEvent::ChainAdvanced { chain, agent })
                .await;
        }
        for chain in completed {
            info!(chain = %chain, "chain completed");
            self.sink.publish(ProgressEvent::ChainCompleted { chain }).await;
        }

        self.tick().await;
    }

    /// Submit a handoff request. Urgent and high tiers drain
    /// immediately; the rest wait for the next tick.
    pub async fn submit_handoff(&self, request: HandoffRequest) {
        let immediate = request.priority.is_immediate();
        {
            let mut queue = self.queue.lock().await;
            queue.push(QueuedHandoff {
                request,
                seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
                enqueued_at: Instant::now(),
            });
        }
        if immediate {
            self.drain_immediate().await;
        }
    }

    /// Process every pending handoff in priority order.
    pub async fn tick(&self) {
        loop {
            let entry = { self.queue.lock().await.pop() };
            match entry {
                Some(entry) => self.process(entry).await,
                None => break,
            }
        }
    }

    /// Process pending urgent and high handoffs only. Lower tiers keep
    /// their place in the queue.
    async fn drain_immediate(&self) {
        loop {
            let entry = {
                let mut queue = self.queue.lock().await;
                if queue
                    .peek()
                    .is_some_and(|e| e.request.priority.is_immediate())
                {
                    queue.pop()
                } else {
                    None
                }
            };
            match entry {
                Some(entry) => self.process(entry).await,
                None => break,
            }
        }
    }

    async fn process(&self, entry: QueuedHandoff) {
        let latency_ms = entry.enqueued_at.elapsed().as_secs_f64() * 1000.0;
        {
            let mut latencies = self.latencies.lock().await;
            latencies.push_back(latency_ms);
            while latencies.len() > self.config.handoff_window {
                latencies.pop_front();
            }
        }
        self.processed.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(
            to_agent = %entry.request.to_agent,
            task_id = %entry.request.task_id,
            latency_ms,
            "handoff processed"
        );
        self.sink
            .publish(ProgressEvent::HandoffProcessed {
                to_agent: entry.request.to_agent.clone(),
                latency_ms,
            })
            .await;
    }

    /// Metrics snapshot.
    pub async fn metrics(&self) -> HandoffMetrics {
        let latencies = self.latencies.lock().await;
        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        let ok = self.completions_ok.load(AtomicOrdering::Relaxed);
        let failed = self.completions_failed.load(AtomicOrdering::Relaxed);
        let total = ok + failed;
        HandoffMetrics {
            processed: self.processed.load(AtomicOrdering::Relaxed),
            failed_completions: failed,
            queue_depth: self.queue.lock().await.len(),
            average_latency_ms,
            success_rate: if total == 0 {
                1.0
            } else {
                ok as f64 / total as f64
            },
        }
    }

    /// Run the completion loop until shutdown. Consumes the receiver;
    /// callable once.
    pub fn spawn(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let rx = { dispatcher.rx.lock().await.take() };
            let Some(mut rx) = rx else {
                warn!("handoff completion loop already running");
                return;
            };
            info!("handoff dispatcher started");
            loop {
                tokio::select! {
                    signal = rx.recv() => match signal {
                        Some(signal) => dispatcher.signal_completion(signal).await,
                        None => break,
                    },
                    _ = shutdown.recv() => {
                        info!("handoff dispatcher shutting down");
                        break;
                    }
                }
            }
        })
    }
}
