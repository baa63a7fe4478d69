mod database;
mod health;
mod observability;

pub use database::DatabaseConfig;
pub use health::HealthConfig;
pub use observability::ObservabilityConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SupervisorError};
use crate::event::OverflowPolicy;
use crate::routing::LoadWeights;

/// Root configuration for the supervisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Persistence configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Routing configuration.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Health monitor configuration.
    #[serde(default)]
    pub health: HealthConfig,

    /// Event hub configuration.
    #[serde(default)]
    pub events: EventsConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl SupervisorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SupervisorError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| SupervisorError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.routing.weights().validate()?;
        self.health.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allowed CORS origins; `*` allows any.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Default candidate pool size.
    #[serde(default = "default_k_nearest")]
    pub k_nearest: i64,

    #[serde(default = "default_cpu_weight")]
    pub cpu_weight: f64,

    #[serde(default = "default_memory_weight")]
    pub memory_weight: f64,

    #[serde(default = "default_connection_weight")]
    pub connection_weight: f64,
}

impl RoutingConfig {
    pub fn weights(&self) -> LoadWeights {
        LoadWeights {
            cpu: self.cpu_weight,
            memory: self.memory_weight,
            connections: self.connection_weight,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            k_nearest: default_k_nearest(),
            cpu_weight: default_cpu_weight(),
            memory_weight: default_memory_weight(),
            connection_weight: default_connection_weight(),
        }
    }
}

fn default_k_nearest() -> i64 {
    3
}

fn default_cpu_weight() -> f64 {
    0.4
}

fn default_memory_weight() -> f64 {
    0.3
}

fn default_connection_weight() -> f64 {
    0.3
}

/// Event hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Pending events kept per subscriber.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Events queued between publishers and the dispatch loop.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    /// What to drop when a subscriber falls behind.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl EventsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_buffer == 0 || self.inbound_capacity == 0 {
            return Err(SupervisorError::Config(
                "event buffers must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
            inbound_capacity: default_inbound_capacity(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_inbound_capacity() -> usize {
    4096
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => result = result.replace(&cap[0], &value),
            Err(_) => tracing::warn!(
                var = var_name,
                "Config references an unset environment variable, keeping it verbatim"
            ),
        }
    }

    result
}
