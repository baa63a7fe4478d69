use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use arx_core::cluster::{NewNode, Node, NodeCounts, NodeId, NodeMetrics, NodePatch, NodeStatus};
use arx_core::error::{Result, SupervisorError};
use arx_core::event::{Event, HealthChange};
use arx_core::health::{HealthCounters, HealthProbeResult, HealthThresholds, HealthTransition};

use crate::events::EventHub;

/// Canonical state of one node.
struct NodeRecord {
    node: Node,
    counters: HealthCounters,
    /// Insertion sequence; defines registry iteration order.
    seq: u64,
}

type RecordRef = Arc<Mutex<NodeRecord>>;

/// Authoritative in-memory store of node records.
///
/// The map lock is only taken exclusively to insert or remove a record.
/// Every other mutation holds it shared and serializes on the record's own
/// mutex, so updates to unrelated nodes never contend. Events are published
/// while the record lock is still held, which keeps each node's events in the
/// same order as its mutations.
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, RecordRef>>,
    next_seq: AtomicU64,
    events: Arc<EventHub>,
}

impl NodeRegistry {
    /// Create a new, empty node registry.
    pub fn new(events: Arc<EventHub>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Get the event hub this registry publishes to.
    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    /// Load persisted nodes at startup. Emits no events.
    ///
    /// Nodes whose ID is already present are skipped. Returns how many were
    /// loaded.
    pub async fn restore(&self, nodes: Vec<Node>) -> usize {
        let mut map = self.nodes.write().await;
        let mut loaded = 0;
        for node in nodes {
            if map.contains_key(&node.id) {
                tracing::warn!(node_id = %node.id, "Skipping duplicate node during restore");
                continue;
            }
            let record = NodeRecord {
                seq: self.next_seq(),
                counters: HealthCounters::default(),
                node,
            };
            map.insert(record.node.id, Arc::new(Mutex::new(record)));
            loaded += 1;
        }
        loaded
    }

    /// Register a new node.
    pub async fn register(&self, new: NewNode) -> Result<Node> {
        let node = Node::from_new(NodeId::new(), new)?;

        let mut map = self.nodes.write().await;
        let record = NodeRecord {
            node: node.clone(),
            counters: HealthCounters::default(),
            seq: self.next_seq(),
        };
        map.insert(node.id, Arc::new(Mutex::new(record)));
        self.events.publish(Event::NodeRegistered(node.clone()));
        drop(map);

        tracing::info!(
            node_id = %node.id,
            name = %node.name,
            status = %node.status,
            "Node registered"
        );
        Ok(node)
    }

    /// Get a snapshot of a node.
    pub async fn get(&self, id: NodeId) -> Result<Node> {
        let record = self.record(id).await?;
        let record = record.lock().await;
        Ok(record.node.clone())
    }

    /// Snapshot of all nodes, optionally filtered by status, in registration
    /// order.
    pub async fn list(&self, status: Option<NodeStatus>) -> Vec<Node> {
        let map = self.nodes.read().await;
        let mut snapshot = Vec::with_capacity(map.len());
        for record in map.values() {
            let record = record.lock().await;
            if status.map_or(true, |s| record.node.status == s) {
                snapshot.push((record.seq, record.node.clone()));
            }
        }
        drop(map);

        snapshot.sort_by_key(|(seq, _)| *seq);
        snapshot.into_iter().map(|(_, node)| node).collect()
    }

    /// Nodes that can currently accept work.
    pub async fn healthy_nodes(&self) -> Vec<Node> {
        self.list(Some(NodeStatus::Healthy)).await
    }

    /// Overwrite the metrics snapshot and optionally the status.
    ///
    /// A status change resets the probe counters. Non-finite usage figures
    /// are rejected.
    pub async fn update_metrics(
        &self,
        id: NodeId,
        metrics: NodeMetrics,
        status: Option<NodeStatus>,
    ) -> Result<Node> {
        metrics.validate()?;

        let map = self.nodes.read().await;
        let record = map
            .get(&id)
            .ok_or_else(|| SupervisorError::node_not_found(id))?;
        let mut record = record.lock().await;

        let previous = record.node.status;
        record.node.metrics = metrics;
        if let Some(status) = status {
            record.node.status = status;
        }
        record.node.updated_at = Utc::now();

        if record.node.status != previous {
            record.counters.reset();
        }
        self.publish_change(&record.node, previous);
        Ok(record.node.clone())
    }

    /// Apply one probe result through the health state machine.
    ///
    /// Returns `None` when the result was discarded: the node was deleted or
    /// deactivated while the probe was in flight. Otherwise exactly one event
    /// is emitted: `node_health_changed` on a transition, `node_updated`
    /// otherwise.
    pub async fn record_probe(
        &self,
        result: &HealthProbeResult,
        thresholds: &HealthThresholds,
    ) -> Option<HealthTransition> {
        let map = self.nodes.read().await;
        let record = map.get(&result.node_id)?;
        let mut record = record.lock().await;

        let previous = record.node.status;
        if !previous.is_probed() {
            return None;
        }

        let current = record
            .counters
            .observe(previous, result.success, thresholds);
        if let Some(metrics) = result.metrics {
            record.node.metrics = metrics;
        }
        record.node.status = current;
        record.node.last_health_check = Some(result.checked_at);
        record.node.updated_at = Utc::now();

        let transition = HealthTransition { previous, current };
        if transition.changed() {
            tracing::info!(
                node_id = %record.node.id,
                from = %previous,
                to = %current,
                failures = record.counters.consecutive_failures,
                successes = record.counters.consecutive_successes,
                "Node health changed"
            );
        }
        self.publish_change(&record.node, previous);
        Some(transition)
    }

    /// Administrative partial update.
    ///
    /// A patch that leaves every field as it is changes nothing and emits
    /// nothing.
    pub async fn update_fields(&self, id: NodeId, patch: NodePatch) -> Result<Node> {
        patch.validate()?;

        let map = self.nodes.read().await;
        let record = map
            .get(&id)
            .ok_or_else(|| SupervisorError::node_not_found(id))?;
        let mut record = record.lock().await;

        if !patch.changes(&record.node) {
            return Ok(record.node.clone());
        }

        let previous = record.node.status;
        if patch.apply_to(&mut record.node) {
            record.counters.reset();
            tracing::info!(
                node_id = %id,
                from = %previous,
                to = %record.node.status,
                "Node status changed administratively"
            );
        }
        self.publish_change(&record.node, previous);
        Ok(record.node.clone())
    }

    /// Remove a node.
    pub async fn delete(&self, id: NodeId) -> Result<()> {
        let mut map = self.nodes.write().await;
        if map.remove(&id).is_none() {
            return Err(SupervisorError::node_not_found(id));
        }
        self.events.publish(Event::NodeDeleted { node_id: id });
        drop(map);

        tracing::info!(node_id = %id, "Node deleted");
        Ok(())
    }

    /// Node count by status.
    pub async fn counts(&self) -> NodeCounts {
        let map = self.nodes.read().await;
        let mut counts = NodeCounts::default();
        for record in map.values() {
            counts.add(record.lock().await.node.status);
        }
        counts
    }

    /// Number of registered nodes.
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    async fn record(&self, id: NodeId) -> Result<RecordRef> {
        self.nodes
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SupervisorError::node_not_found(id))
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn publish_change(&self, node: &Node, previous: NodeStatus) {
        let event = if node.status != previous {
            Event::NodeHealthChanged(HealthChange {
                node: node.clone(),
                previous,
                current: node.status,
            })
        } else {
            Event::NodeUpdated(node.clone())
        };
        self.events.publish(event);
    }
}
