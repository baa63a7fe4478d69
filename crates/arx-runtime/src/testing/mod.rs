//! Test doubles for the supervisor's external collaborators.
//!
//! Available to this crate's own tests and, with the `testing` feature, to
//! downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arx_core::cluster::{Node, NodeMetrics};
use arx_core::error::{Result, SupervisorError};
use arx_core::event::Event;
use arx_core::health::{HealthProbe, ProbeError, ProbeFuture, ProbeReport};
use arx_core::store::{NodeStore, StoreFuture};

/// Raw outcome a [`ScriptedProbe`] hands back.
pub type ProbeOutcome = std::result::Result<ProbeReport, ProbeError>;

/// A healthy report with the given metrics.
pub fn healthy(metrics: NodeMetrics) -> ProbeOutcome {
    Ok(ProbeReport {
        healthy: true,
        metrics,
    })
}

/// A transport failure.
pub fn unreachable() -> ProbeOutcome {
    Err(ProbeError::Transport("connection refused".to_string()))
}

#[derive(Default)]
struct ScriptState {
    scripts: HashMap<String, VecDeque<ProbeOutcome>>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
}

/// Probe whose answers are scripted per node endpoint.
///
/// Each call pops the next scripted outcome for the node's endpoint and
/// falls back to the default outcome once the script is exhausted.
pub struct ScriptedProbe {
    state: Mutex<ScriptState>,
    default: ProbeOutcome,
}

impl ScriptedProbe {
    /// Create a probe that answers healthy with zero load by default.
    pub fn new() -> Self {
        Self::with_default(healthy(NodeMetrics::default()))
    }

    /// Create a probe with a custom fallback outcome.
    pub fn with_default(default: ProbeOutcome) -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            default,
        }
    }

    /// Queue outcomes for an endpoint.
    pub fn script(&self, endpoint: &str, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.lock()
            .scripts
            .entry(endpoint.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Make every probe of an endpoint take `delay` before answering.
    pub fn delay(&self, endpoint: &str, delay: Duration) {
        self.lock().delays.insert(endpoint.to_string(), delay);
    }

    /// How many times an endpoint was probed.
    pub fn calls(&self, endpoint: &str) -> usize {
        self.lock().calls.get(endpoint).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ScriptedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe<'a>(&'a self, node: &'a Node) -> ProbeFuture<'a> {
        let (outcome, delay) = {
            let mut state = self.lock();
            *state.calls.entry(node.endpoint.clone()).or_default() += 1;
            let outcome = state
                .scripts
                .get_mut(&node.endpoint)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| self.default.clone());
            (outcome, state.delays.get(&node.endpoint).copied())
        };

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }
}

/// In-memory [`NodeStore`] that mirrors node events and keeps an audit log.
#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: Mutex<Vec<Node>>,
    events: Mutex<Vec<Event>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryNodeStore {
    /// Create a store pre-populated with nodes.
    pub fn with_nodes(nodes: Vec<Node>) -> Arc<Self> {
        let store = Self::default();
        *lock(&store.nodes) = nodes;
        Arc::new(store)
    }

    /// Make subsequent `record_event` calls fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    /// Persisted node snapshots.
    pub fn nodes(&self) -> Vec<Node> {
        lock(&self.nodes).clone()
    }

    fn apply(&self, event: &Event) {
        let mut nodes = lock(&self.nodes);
        match event {
            Event::NodeRegistered(node) | Event::NodeUpdated(node) => upsert(&mut nodes, node),
            Event::NodeHealthChanged(change) => upsert(&mut nodes, &change.node),
            Event::NodeDeleted { node_id } => nodes.retain(|n| n.id != *node_id),
            _ => {}
        }
    }
}

impl NodeStore for MemoryNodeStore {
    fn load_all_nodes(&self) -> StoreFuture<'_, Vec<Node>> {
        Box::pin(async move { Ok(self.nodes()) })
    }

    fn record_event<'a>(&'a self, event: &'a Event) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(SupervisorError::Database("store unavailable".to_string()));
            }
            self.apply(event);
            lock(&self.events).push(event.clone());
            Ok::<(), SupervisorError>(())
        })
    }

    fn sync_nodes<'a>(&'a self, nodes: &'a [Node]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(SupervisorError::Database("store unavailable".to_string()));
            }
            *lock(&self.nodes) = nodes.to_vec();
            Ok::<(), SupervisorError>(())
        })
    }
}

fn upsert(nodes: &mut Vec<Node>, node: &Node) {
    match nodes.iter_mut().find(|n| n.id == node.id) {
        Some(existing) => *existing = node.clone(),
        None => nodes.push(node.clone()),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Wait until `check` holds, polling every few milliseconds.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            return Err(SupervisorError::Internal(
                "condition not met before timeout".to_string(),
            ));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}
