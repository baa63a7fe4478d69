use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use arx_core::cluster::{Node, NodeId};
use arx_core::config::HealthConfig;
use arx_core::health::{HealthProbe, HealthProbeResult, HealthThresholds, ProbeError};

use crate::cluster::NodeRegistry;

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Interval between probe rounds.
    pub interval: Duration,
    /// Hard limit for a single probe.
    pub probe_timeout: Duration,
    pub thresholds: HealthThresholds,
    /// How long shutdown waits for in-flight probes before abandoning them.
    pub shutdown_grace: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for HealthMonitorConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            interval: config.interval(),
            probe_timeout: config.timeout(),
            thresholds: config.thresholds(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Periodically probes every monitored node and feeds the results through
/// the registry's health state machine.
///
/// Each node is probed by its own task, so a slow node only delays itself.
/// A node whose previous probe is still running is skipped for that tick.
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: HealthMonitorConfig,
    in_flight: Arc<Mutex<HashSet<NodeId>>>,
    running: AtomicBool,
}

impl HealthMonitor {
    /// Create a new health monitor.
    pub fn new(
        registry: Arc<NodeRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            running: AtomicBool::new(false),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run probe rounds until `shutdown` is cancelled.
    ///
    /// After cancellation no new probes start; in-flight ones get the
    /// configured grace period and are then abandoned.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        tracing::info!(
            interval = ?self.config.interval,
            timeout = ?self.config.probe_timeout,
            failure_threshold = self.config.thresholds.failure_threshold,
            recovery_threshold = self.config.thresholds.recovery_threshold,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(in_flight = tasks.len(), "Health monitor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let spawned = self.spawn_round(&mut tasks).await;
                    tracing::trace!(spawned, "Probe round started");
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Probe task failed");
                    }
                }
            }
        }

        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                abandoned = tasks.len(),
                "Abandoning in-flight probes after grace period"
            );
            tasks.abort_all();
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Probe every monitored node once and wait for all results.
    ///
    /// Returns the number of probes that ran.
    pub async fn check_all(&self) -> usize {
        let mut tasks = JoinSet::new();
        let spawned = self.spawn_round(&mut tasks).await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Probe task failed");
            }
        }
        spawned
    }

    async fn spawn_round(&self, tasks: &mut JoinSet<()>) -> usize {
        let nodes = self.registry.list(None).await;
        let mut spawned = 0;

        for node in nodes.into_iter().filter(|n| n.status.is_probed()) {
            let Some(guard) = InFlight::acquire(&self.in_flight, node.id) else {
                tracing::debug!(node_id = %node.id, "Previous probe still running, skipping");
                continue;
            };

            let registry = self.registry.clone();
            let probe = self.probe.clone();
            let timeout = self.config.probe_timeout;
            let thresholds = self.config.thresholds;
            tasks.spawn(async move {
                let _guard = guard;
                probe_node(&registry, probe.as_ref(), node, timeout, &thresholds).await;
            });
            spawned += 1;
        }

        spawned
    }
}

async fn probe_node(
    registry: &NodeRegistry,
    probe: &dyn HealthProbe,
    node: Node,
    timeout: Duration,
    thresholds: &HealthThresholds,
) {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, probe.probe(&node)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };
    let result = HealthProbeResult::from_outcome(node.id, outcome, started.elapsed());

    if let Some(error) = &result.error {
        tracing::debug!(
            node_id = %node.id,
            endpoint = %node.endpoint,
            latency_ms = result.latency.as_millis() as u64,
            error = %error,
            "Probe failed"
        );
    }

    if registry.record_probe(&result, thresholds).await.is_none() {
        tracing::debug!(node_id = %node.id, "Probe result discarded, node no longer monitored");
    }
}

/// Marks a node as having a probe in flight until dropped.
struct InFlight {
    set: Arc<Mutex<HashSet<NodeId>>>,
    id: NodeId,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<HashSet<NodeId>>>, id: NodeId) -> Option<Self> {
        let inserted = set.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
        inserted.then(|| Self {
            set: set.clone(),
            id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}
