use serde::{Deserialize, Serialize};

use crate::cluster::NodeStatus;

/// Consecutive-outcome thresholds that drive status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Consecutive failed probes before a node becomes `unhealthy`.
    pub failure_threshold: u32,
    /// Consecutive successful probes before a node becomes `healthy`.
    pub recovery_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

/// Per-node probe streak counters.
///
/// Owned by the registry record so that a node's counters and status are
/// always mutated together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounters {
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl HealthCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed one probe outcome and return the resulting status.
    ///
    /// `inactive` nodes are outside the machine and are returned unchanged
    /// without touching the counters.
    pub fn observe(
        &mut self,
        current: NodeStatus,
        success: bool,
        thresholds: &HealthThresholds,
    ) -> NodeStatus {
        if !current.is_probed() {
            return current;
        }

        if success {
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            self.consecutive_failures = 0;
            if self.consecutive_successes >= thresholds.recovery_threshold
                && matches!(current, NodeStatus::Active | NodeStatus::Unhealthy)
            {
                return NodeStatus::Healthy;
            }
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.consecutive_successes = 0;
            if self.consecutive_failures >= thresholds.failure_threshold
                && matches!(current, NodeStatus::Active | NodeStatus::Healthy)
            {
                return NodeStatus::Unhealthy;
            }
        }

        current
    }
}

/// Status before and after applying a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthTransition {
    pub previous: NodeStatus,
    pub current: NodeStatus,
}

impl HealthTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
