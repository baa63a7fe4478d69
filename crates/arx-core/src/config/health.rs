use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupervisorError};
use crate::health::HealthThresholds;

/// Health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between probe rounds.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Per-probe timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Consecutive failures before a node is marked unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successes before a node is marked healthy.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,

    /// Path appended to a node's endpoint for probing.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// How long shutdown waits for in-flight probes.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            failure_threshold: self.failure_threshold,
            recovery_threshold: self.recovery_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 || self.timeout_secs == 0 {
            return Err(SupervisorError::Config(
                "health interval and timeout must be non-zero".to_string(),
            ));
        }
        if self.failure_threshold == 0 || self.recovery_threshold == 0 {
            return Err(SupervisorError::Config(
                "health thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            timeout_secs: default_timeout(),
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
            probe_path: default_probe_path(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_check_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_threshold() -> u32 {
    2
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_shutdown_grace() -> u64 {
    5
}
