//! Domain events distributed by the event hub.
//!
//! Wire shape is `{"type": "<kind>", "payload": {...}}`. The enum is
//! `#[non_exhaustive]`: consumers must keep a fallback arm for kinds they do
//! not know yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::{Location, Node, NodeId, NodeStatus};
use crate::routing::RoutingDecision;

/// A state change somewhere in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Event {
    /// A node was added to the registry.
    NodeRegistered(Node),
    /// Node fields or metrics changed without a status transition.
    NodeUpdated(Node),
    /// A node was removed.
    NodeDeleted { node_id: NodeId },
    /// A node changed status.
    NodeHealthChanged(HealthChange),
    /// The routing engine selected a node.
    RouteDecided(RouteDecided),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeRegistered(_) => EventKind::NodeRegistered,
            Self::NodeUpdated(_) => EventKind::NodeUpdated,
            Self::NodeDeleted { .. } => EventKind::NodeDeleted,
            Self::NodeHealthChanged(_) => EventKind::NodeHealthChanged,
            Self::RouteDecided(_) => EventKind::RouteDecided,
        }
    }

    /// The node this event is about.
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::NodeRegistered(node) | Self::NodeUpdated(node) => node.id,
            Self::NodeDeleted { node_id } => *node_id,
            Self::NodeHealthChanged(change) => change.node.id,
            Self::RouteDecided(route) => route.node_id,
        }
    }
}

/// Event discriminant, for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NodeRegistered,
    NodeUpdated,
    NodeDeleted,
    NodeHealthChanged,
    RouteDecided,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeRegistered => "node_registered",
            Self::NodeUpdated => "node_updated",
            Self::NodeDeleted => "node_deleted",
            Self::NodeHealthChanged => "node_health_changed",
            Self::RouteDecided => "route_decided",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of `node_health_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthChange {
    /// Node snapshot after the change.
    pub node: Node,
    pub previous: NodeStatus,
    pub current: NodeStatus,
}

/// Payload of `route_decided`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecided {
    pub request_id: Option<String>,
    pub coordinates: Location,
    pub node_id: NodeId,
    pub distance: f64,
    pub load_score: f64,
    pub decided_at: DateTime<Utc>,
}

impl From<&RoutingDecision> for RouteDecided {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            request_id: decision.request_id.clone(),
            coordinates: decision.coordinates,
            node_id: decision.node.id,
            distance: decision.distance,
            load_score: decision.load_score,
            decided_at: decision.decided_at,
        }
    }
}

/// What the hub does when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending event to make room.
    #[default]
    DropOldest,
    /// Discard the incoming event.
    DropNewest,
}
