use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SupervisorError};

/// Unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from the textual UUID form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SupervisorError::Validation(format!("invalid node id: {}", s)))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point in the shared 2D coordinate space of nodes and requests.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Location) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Node status, driven by administration and the health state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Registered but not probed or routed to.
    Inactive,
    /// Activated, waiting for enough successful probes.
    Active,
    /// Passing health checks; eligible for routing.
    Healthy,
    /// Failing health checks.
    Unhealthy,
}

impl NodeStatus {
    /// Convert to string for storage and the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(Self::Inactive),
            "active" => Some(Self::Active),
            "healthy" => Some(Self::Healthy),
            "unhealthy" => Some(Self::Unhealthy),
            _ => None,
        }
    }

    /// All statuses, in lifecycle order.
    pub fn all() -> [Self; 4] {
        [Self::Inactive, Self::Active, Self::Healthy, Self::Unhealthy]
    }

    /// Whether the health monitor probes nodes in this status.
    pub fn is_probed(&self) -> bool {
        !matches!(self, Self::Inactive)
    }

    /// Whether the routing engine may select nodes in this status.
    pub fn can_accept_work(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Load metrics reported by a node's probe endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// CPU usage percentage (0-100).
    pub cpu_usage: f64,
    /// Memory usage percentage (0-100).
    pub memory_usage: f64,
    /// Current connection count. May transiently exceed capacity.
    pub active_connections: u32,
}

impl NodeMetrics {
    pub fn new(cpu_usage: f64, memory_usage: f64, active_connections: u32) -> Self {
        Self {
            cpu_usage,
            memory_usage,
            active_connections,
        }
    }

    /// Reject NaN or infinite usage figures.
    pub fn validate(&self) -> Result<()> {
        if !self.cpu_usage.is_finite() || !self.memory_usage.is_finite() {
            return Err(SupervisorError::Validation(
                "usage metrics must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// A registered processing node.
///
/// Values of this type handed out by the registry are snapshots; mutating
/// them has no effect on the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node ID.
    pub id: NodeId,
    /// Display name. Not unique.
    pub name: String,
    /// Position in coordinate space.
    pub location: Location,
    /// Base address used for probes and dispatch.
    pub endpoint: String,
    /// Maximum concurrent load. Always positive.
    pub capacity: u32,
    /// Current status.
    pub status: NodeStatus,
    /// Latest metrics snapshot.
    #[serde(flatten)]
    pub metrics: NodeMetrics,
    /// Last completed health check, if any.
    pub last_health_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build a node from a validated registration request.
    pub fn from_new(id: NodeId, new: NewNode) -> Result<Self> {
        let capacity = new.validate()?;
        let now = Utc::now();
        Ok(Self {
            id,
            name: new.name,
            location: new.location,
            endpoint: new.endpoint,
            capacity,
            status: if new.activate {
                NodeStatus::Active
            } else {
                NodeStatus::Inactive
            },
            metrics: NodeMetrics::default(),
            last_health_check: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Connection saturation (active connections / capacity). Not clamped.
    pub fn connection_ratio(&self) -> f64 {
        f64::from(self.metrics.active_connections) / f64::from(self.capacity.max(1))
    }
}

/// Administrative registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    pub location: Location,
    pub endpoint: String,
    /// Signed so that non-positive requests can be rejected instead of wrapped.
    pub capacity: i64,
    /// Start `active` instead of `inactive`.
    #[serde(default)]
    pub activate: bool,
}

impl NewNode {
    pub fn new(
        name: impl Into<String>,
        location: Location,
        endpoint: impl Into<String>,
        capacity: i64,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            endpoint: endpoint.into(),
            capacity,
            activate: false,
        }
    }

    /// Request activation on registration.
    pub fn activated(mut self) -> Self {
        self.activate = true;
        self
    }

    /// Validate the request, returning the capacity as stored.
    pub fn validate(&self) -> Result<u32> {
        validate_name(&self.name)?;
        validate_endpoint(&self.endpoint)?;
        validate_location(&self.location)?;
        validate_capacity(self.capacity)
    }
}

/// Partial administrative update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.location.is_none()
            && self.endpoint.is_none()
            && self.capacity.is_none()
            && self.status.is_none()
    }

    /// Whether applying the patch would alter `node`.
    ///
    /// Fields equal to the current value do not count.
    pub fn changes(&self, node: &Node) -> bool {
        self.name.as_ref().is_some_and(|name| *name != node.name)
            || self.location.is_some_and(|location| location != node.location)
            || self
                .endpoint
                .as_ref()
                .is_some_and(|endpoint| *endpoint != node.endpoint)
            || self
                .capacity
                .is_some_and(|capacity| capacity != i64::from(node.capacity))
            || self.status.is_some_and(|status| status != node.status)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        if let Some(location) = &self.location {
            validate_location(location)?;
        }
        if let Some(capacity) = self.capacity {
            validate_capacity(capacity)?;
        }
        Ok(())
    }

    /// Apply to a node. Returns whether the status changed.
    ///
    /// Callers must have validated the patch.
    pub fn apply_to(&self, node: &mut Node) -> bool {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(location) = self.location {
            node.location = location;
        }
        if let Some(endpoint) = &self.endpoint {
            node.endpoint = endpoint.clone();
        }
        if let Some(capacity) = self.capacity {
            node.capacity = capacity as u32;
        }
        let status_changed = match self.status {
            Some(status) if status != node.status => {
                node.status = status;
                true
            }
            _ => false,
        };
        node.updated_at = Utc::now();
        status_changed
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SupervisorError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.trim().is_empty() {
        return Err(SupervisorError::Validation(
            "endpoint must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_location(location: &Location) -> Result<()> {
    if !location.is_finite() {
        return Err(SupervisorError::Validation(
            "location coordinates must be finite".to_string(),
        ));
    }
    Ok(())
}

fn validate_capacity(capacity: i64) -> Result<u32> {
    if capacity <= 0 {
        return Err(SupervisorError::Validation(format!(
            "capacity must be positive, got {}",
            capacity
        )));
    }
    u32::try_from(capacity)
        .map_err(|_| SupervisorError::Validation(format!("capacity {} is too large", capacity)))
}

/// Node count statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub inactive: usize,
    pub active: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub total: usize,
}

impl NodeCounts {
    /// Count one node with the given status.
    pub fn add(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::Inactive => self.inactive += 1,
            NodeStatus::Active => self.active += 1,
            NodeStatus::Healthy => self.healthy += 1,
            NodeStatus::Unhealthy => self.unhealthy += 1,
        }
        self.total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_node(capacity: i64) -> NewNode {
        NewNode::new("edge-1", Location::new(1.0, 2.0), "http://10.0.0.1:9000", capacity)
    }

    #[test]
    fn test_node_id_generation() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_node_id_parse() {
        let id = NodeId::new();
        assert_eq!(NodeId::parse(&id.to_string()).unwrap(), id);
        assert!(NodeId::parse("not-a-uuid").unwrap_err().is_validation());
    }

    #[test]
    fn test_node_status_conversion() {
        for status in NodeStatus::all() {
            assert_eq!(NodeStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(NodeStatus::from_str("dead"), None);
    }

    #[test]
    fn test_only_healthy_accepts_work() {
        assert!(NodeStatus::Healthy.can_accept_work());
        assert!(!NodeStatus::Active.can_accept_work());
        assert!(!NodeStatus::Unhealthy.can_accept_work());
        assert!(!NodeStatus::Inactive.can_accept_work());
        assert!(!NodeStatus::Inactive.is_probed());
        assert!(NodeStatus::Unhealthy.is_probed());
    }

    #[test]
    fn test_distance_symmetric_and_zero_on_self() {
        let a = Location::new(3.0, -4.0);
        let b = Location::new(-1.5, 7.25);
        assert_eq!(a.distance_to(&b), b.distance_to(&a));
        assert_eq!(a.distance_to(&a), 0.0);
        assert!((Location::new(0.0, 0.0).distance_to(&Location::new(3.0, 4.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_registration_validation() {
        assert!(new_node(0).validate().unwrap_err().is_validation());
        assert!(new_node(-5).validate().unwrap_err().is_validation());
        assert_eq!(new_node(100).validate().unwrap(), 100);

        let mut unnamed = new_node(10);
        unnamed.name = "  ".to_string();
        assert!(unnamed.validate().is_err());

        let mut no_endpoint = new_node(10);
        no_endpoint.endpoint = String::new();
        assert!(no_endpoint.validate().is_err());

        let mut nan = new_node(10);
        nan.location = Location::new(f64::NAN, 0.0);
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_from_new_initial_status() {
        let node = Node::from_new(NodeId::new(), new_node(10)).unwrap();
        assert_eq!(node.status, NodeStatus::Inactive);
        assert!(node.last_health_check.is_none());

        let node = Node::from_new(NodeId::new(), new_node(10).activated()).unwrap();
        assert_eq!(node.status, NodeStatus::Active);
    }

    #[test]
    fn test_patch_leaves_unspecified_fields() {
        let mut node = Node::from_new(NodeId::new(), new_node(10)).unwrap();
        let patch = NodePatch {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        assert!(!patch.apply_to(&mut node));
        assert_eq!(node.name, "renamed");
        assert_eq!(node.endpoint, "http://10.0.0.1:9000");
        assert_eq!(node.capacity, 10);
        assert_eq!(node.location, Location::new(1.0, 2.0));

        let patch = NodePatch {
            status: Some(NodeStatus::Active),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut node));
        assert_eq!(node.status, NodeStatus::Active);
    }

    #[test]
    fn test_patch_validation() {
        let patch = NodePatch {
            capacity: Some(0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(NodePatch::default().is_empty());
        assert!(NodePatch::default().validate().is_ok());
    }

    #[test]
    fn test_patch_with_current_values_changes_nothing() {
        let node = Node::from_new(NodeId::new(), new_node(10)).unwrap();
        let same = NodePatch {
            name: Some(node.name.clone()),
            capacity: Some(10),
            status: Some(node.status),
            ..Default::default()
        };
        assert!(!same.is_empty());
        assert!(!same.changes(&node));

        let renamed = NodePatch {
            name: Some("other".to_string()),
            ..Default::default()
        };
        assert!(renamed.changes(&node));
        assert!(!NodePatch::default().changes(&node));
    }

    #[test]
    fn test_metrics_validation() {
        assert!(NodeMetrics::new(10.0, 20.0, 3).validate().is_ok());
        assert!(NodeMetrics::new(f64::NAN, 20.0, 3).validate().is_err());
        assert!(NodeMetrics::new(10.0, f64::INFINITY, 3).validate().is_err());
    }

    #[test]
    fn test_connection_ratio_not_clamped() {
        let mut node = Node::from_new(NodeId::new(), new_node(10)).unwrap();
        node.metrics.active_connections = 15;
        assert!((node.connection_ratio() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_node_json_shape() {
        let node = Node::from_new(NodeId::new(), new_node(10)).unwrap();
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["status"], "inactive");
        assert_eq!(json["cpu_usage"], 0.0);
        assert_eq!(json["location"]["x"], 1.0);
        assert!(json["last_health_check"].is_null());
    }

    #[test]
    fn test_node_counts() {
        let mut counts = NodeCounts::default();
        counts.add(NodeStatus::Healthy);
        counts.add(NodeStatus::Healthy);
        counts.add(NodeStatus::Inactive);
        assert_eq!(counts.healthy, 2);
        assert_eq!(counts.inactive, 1);
        assert_eq!(counts.total, 3);
    }
}
