use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::{Location, Node};
use crate::error::{Result, SupervisorError};

/// Weights of the load score components. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadWeights {
    pub cpu: f64,
    pub memory: f64,
    pub connections: f64,
}

impl Default for LoadWeights {
    fn default() -> Self {
        Self {
            cpu: 0.4,
            memory: 0.3,
            connections: 0.3,
        }
    }
}

impl LoadWeights {
    const SUM_TOLERANCE: f64 = 1e-6;

    pub fn validate(&self) -> Result<()> {
        let parts = [self.cpu, self.memory, self.connections];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SupervisorError::Config(
                "load weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(SupervisorError::Config(format!(
                "load weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Weighted load of a node. Lower is better.
///
/// The connection term is not clamped: an over-admitted node scores above
/// its nominal maximum.
pub fn load_score(node: &Node, weights: &LoadWeights) -> f64 {
    weights.cpu * (node.metrics.cpu_usage / 100.0)
        + weights.memory * (node.metrics.memory_usage / 100.0)
        + weights.connections * node.connection_ratio()
}

/// Effective candidate count: non-positive requests mean one.
pub fn effective_k(k: i64) -> usize {
    if k <= 0 {
        1
    } else {
        usize::try_from(k).unwrap_or(usize::MAX)
    }
}

/// A node considered for selection.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub node: &'a Node,
    pub distance: f64,
}

/// The `k` nodes nearest to `origin`.
///
/// Stable sort by distance: equal distances keep the order of `nodes`.
pub fn k_nearest(nodes: &[Node], origin: Location, k: usize) -> Vec<Candidate<'_>> {
    let mut candidates: Vec<Candidate<'_>> = nodes
        .iter()
        .map(|node| Candidate {
            node,
            distance: origin.distance_to(&node.location),
        })
        .collect();

    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    candidates.truncate(k);
    candidates
}

/// Pick the least loaded candidate; ties go to the first one seen.
///
/// A NaN score ranks as the heaviest possible load.
pub fn select_best<'a>(
    candidates: &[Candidate<'a>],
    weights: &LoadWeights,
) -> Option<(Candidate<'a>, f64)> {
    let mut best: Option<(Candidate<'a>, f64, f64)> = None;
    for candidate in candidates {
        let score = load_score(candidate.node, weights);
        let rank = if score.is_nan() { f64::INFINITY } else { score };
        match best {
            Some((_, _, best_rank)) if rank.total_cmp(&best_rank).is_ge() => {}
            _ => best = Some((*candidate, score, rank)),
        }
    }
    best.map(|(candidate, score, _)| (candidate, score))
}

/// A routing request as the core sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Caller-supplied correlation id.
    #[serde(default)]
    pub request_id: Option<String>,
    pub coordinates: Location,
    /// Candidate pool size; the configured default when absent.
    #[serde(default)]
    pub k: Option<i64>,
}

impl RouteRequest {
    pub fn new(coordinates: Location) -> Self {
        Self {
            request_id: None,
            coordinates,
            k: None,
        }
    }

    pub fn with_k(mut self, k: i64) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// The selected node and how it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub request_id: Option<String>,
    pub coordinates: Location,
    /// Snapshot of the node at decision time.
    pub node: Node,
    pub distance: f64,
    pub load_score: f64,
    pub decided_at: DateTime<Utc>,
}

/// Result of a routing call.
///
/// `Unavailable` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Selected(RoutingDecision),
    Unavailable,
}

impl RouteOutcome {
    pub fn decision(&self) -> Option<&RoutingDecision> {
        match self {
            Self::Selected(decision) => Some(decision),
            Self::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{NewNode, NodeId, NodeMetrics, NodeStatus};

    fn node(name: &str, x: f64, y: f64, metrics: NodeMetrics, capacity: i64) -> Node {
        let mut node = Node::from_new(
            NodeId::new(),
            NewNode::new(name, Location::new(x, y), "http://node", capacity),
        )
        .unwrap();
        node.status = NodeStatus::Healthy;
        node.metrics = metrics;
        node
    }

    #[test]
    fn test_default_weights_valid() {
        let w = LoadWeights::default();
        assert!(w.validate().is_ok());
        assert!((w.cpu + w.memory + w.connections - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights() {
        let w = LoadWeights {
            cpu: 0.5,
            memory: 0.5,
            connections: 0.5,
        };
        assert!(w.validate().is_err());
        let w = LoadWeights {
            cpu: 1.2,
            memory: -0.2,
            connections: 0.0,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_load_score_formula() {
        let n = node("a", 0.0, 0.0, NodeMetrics::new(50.0, 20.0, 25), 100);
        let score = load_score(&n, &LoadWeights::default());
        assert!((score - (0.4 * 0.5 + 0.3 * 0.2 + 0.3 * 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_load_score_monotonic_in_connections() {
        let w = LoadWeights::default();
        let mut previous = f64::NEG_INFINITY;
        for conns in [0, 1, 50, 100, 150, 1000] {
            let n = node("a", 0.0, 0.0, NodeMetrics::new(30.0, 30.0, conns), 100);
            let score = load_score(&n, &w);
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_load_score_not_clamped_when_over_capacity() {
        let n = node("a", 0.0, 0.0, NodeMetrics::new(100.0, 100.0, 200), 100);
        assert!(load_score(&n, &LoadWeights::default()) > 1.0);
    }

    #[test]
    fn test_effective_k() {
        assert_eq!(effective_k(0), 1);
        assert_eq!(effective_k(-3), 1);
        assert_eq!(effective_k(5), 5);
    }

    #[test]
    fn test_k_nearest_orders_by_distance() {
        let nodes = vec![
            node("far", 10.0, 0.0, NodeMetrics::default(), 10),
            node("near", 1.0, 0.0, NodeMetrics::default(), 10),
            node("mid", 5.0, 0.0, NodeMetrics::default(), 10),
        ];
        let picked = k_nearest(&nodes, Location::new(0.0, 0.0), 2);
        let names: Vec<_> = picked.iter().map(|c| c.node.name.as_str()).collect();
        assert_eq!(names, vec!["near", "mid"]);
    }

    #[test]
    fn test_k_nearest_ties_keep_input_order() {
        let nodes = vec![
            node("first", 0.0, 1.0, NodeMetrics::default(), 10),
            node("second", 1.0, 0.0, NodeMetrics::default(), 10),
            node("third", 0.0, -1.0, NodeMetrics::default(), 10),
        ];
        let picked = k_nearest(&nodes, Location::new(0.0, 0.0), 2);
        assert_eq!(picked[0].node.name, "first");
        assert_eq!(picked[1].node.name, "second");
    }

    #[test]
    fn test_k_larger_than_pool_uses_all() {
        let nodes = vec![node("only", 3.0, 4.0, NodeMetrics::default(), 10)];
        let picked = k_nearest(&nodes, Location::new(0.0, 0.0), 10);
        assert_eq!(picked.len(), 1);
        assert!((picked[0].distance - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_select_best_lowest_score_first_seen_on_tie() {
        let nodes = vec![
            node("busy", 1.0, 0.0, NodeMetrics::new(90.0, 90.0, 90), 100),
            node("idle-a", 2.0, 0.0, NodeMetrics::new(10.0, 10.0, 0), 100),
            node("idle-b", 3.0, 0.0, NodeMetrics::new(10.0, 10.0, 0), 100),
        ];
        let candidates = k_nearest(&nodes, Location::new(0.0, 0.0), 3);
        let (best, score) = select_best(&candidates, &LoadWeights::default()).unwrap();
        assert_eq!(best.node.name, "idle-a");
        assert!((score - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_select_best_never_prefers_nan_score() {
        let nodes = vec![
            node("broken", 1.0, 0.0, NodeMetrics::new(f64::NAN, 10.0, 0), 100),
            node("busy", 2.0, 0.0, NodeMetrics::new(90.0, 90.0, 90), 100),
        ];
        let candidates = k_nearest(&nodes, Location::new(0.0, 0.0), 2);
        let (best, _) = select_best(&candidates, &LoadWeights::default()).unwrap();
        assert_eq!(best.node.name, "busy");

        let only = vec![node("broken", 1.0, 0.0, NodeMetrics::new(f64::NAN, 0.0, 0), 100)];
        let candidates = k_nearest(&only, Location::new(0.0, 0.0), 1);
        let (best, score) = select_best(&candidates, &LoadWeights::default()).unwrap();
        assert_eq!(best.node.name, "broken");
        assert!(score.is_nan());
    }

    #[test]
    fn test_select_best_empty() {
        assert!(select_best(&[], &LoadWeights::default()).is_none());
    }

    #[test]
    fn test_route_request_builder() {
        let req = RouteRequest::new(Location::new(1.0, 1.0))
            .with_k(2)
            .with_request_id("req-1");
        assert_eq!(req.k, Some(2));
        assert_eq!(req.request_id.as_deref(), Some("req-1"));
    }
}
