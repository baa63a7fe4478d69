use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{Node, NodeId, NodeMetrics};

/// What a probe endpoint reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// The node's own health verdict.
    pub healthy: bool,
    pub metrics: NodeMetrics,
}

/// Health-check transport failures.
///
/// These never leave the health monitor; they become failed probe results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    BadStatus(u16),

    #[error("invalid probe response: {0}")]
    InvalidResponse(String),
}

/// Future returned by [`HealthProbe::probe`].
pub type ProbeFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<ProbeReport, ProbeError>> + Send + 'a>>;

/// Adapter that asks a node about its health and load.
///
/// Implementations do not need to enforce a timeout; the monitor wraps every
/// call in one.
pub trait HealthProbe: Send + Sync {
    fn probe<'a>(&'a self, node: &'a Node) -> ProbeFuture<'a>;
}

/// Outcome of one probe attempt, as fed into the state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthProbeResult {
    pub node_id: NodeId,
    pub success: bool,
    /// Metrics observed, when the endpoint answered at all.
    pub metrics: Option<NodeMetrics>,
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    pub checked_at: DateTime<Utc>,
    /// Failure reason, for logging.
    pub error: Option<String>,
}

impl HealthProbeResult {
    /// Classify a raw probe outcome.
    ///
    /// A node that answers but reports itself unhealthy counts as a failure,
    /// yet its metrics are still kept.
    pub fn from_outcome(
        node_id: NodeId,
        outcome: std::result::Result<ProbeReport, ProbeError>,
        latency: Duration,
    ) -> Self {
        let checked_at = Utc::now();
        match outcome {
            Ok(report) => Self {
                node_id,
                success: report.healthy,
                metrics: Some(report.metrics),
                latency,
                checked_at,
                error: (!report.healthy).then(|| "node reported unhealthy".to_string()),
            },
            Err(e) => Self {
                node_id,
                success: false,
                metrics: None,
                latency,
                checked_at,
                error: Some(e.to_string()),
            },
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_report_is_success() {
        let id = NodeId::new();
        let report = ProbeReport {
            healthy: true,
            metrics: NodeMetrics::new(10.0, 20.0, 3),
        };
        let result = HealthProbeResult::from_outcome(id, Ok(report), Duration::from_millis(12));
        assert!(result.success);
        assert_eq!(result.metrics, Some(NodeMetrics::new(10.0, 20.0, 3)));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_unhealthy_report_keeps_metrics() {
        let report = ProbeReport {
            healthy: false,
            metrics: NodeMetrics::new(99.0, 95.0, 400),
        };
        let result =
            HealthProbeResult::from_outcome(NodeId::new(), Ok(report), Duration::from_millis(5));
        assert!(!result.success);
        assert_eq!(result.metrics.unwrap().active_connections, 400);
    }

    #[test]
    fn test_timeout_is_failure_without_metrics() {
        let result = HealthProbeResult::from_outcome(
            NodeId::new(),
            Err(ProbeError::Timeout(Duration::from_secs(5))),
            Duration::from_secs(5),
        );
        assert!(!result.success);
        assert!(result.metrics.is_none());
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_result_serializes_latency_as_millis() {
        let result = HealthProbeResult::from_outcome(
            NodeId::new(),
            Err(ProbeError::BadStatus(503)),
            Duration::from_millis(250),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["latency"], 250);
    }
}
