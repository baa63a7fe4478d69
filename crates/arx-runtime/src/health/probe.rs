use std::time::Duration;

use serde::Deserialize;

use arx_core::cluster::{Node, NodeMetrics};
use arx_core::health::{HealthProbe, ProbeError, ProbeFuture, ProbeReport};

/// Body served by a node's health endpoint.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    load: Option<NodeLoad>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeLoad {
    #[serde(default)]
    cpu_percent: f64,
    #[serde(default)]
    memory_percent: f64,
    #[serde(default)]
    active_connections: u32,
}

impl HealthResponse {
    fn into_report(self) -> Result<ProbeReport, ProbeError> {
        let load = self.load.unwrap_or_default();
        if !load.cpu_percent.is_finite() || !load.memory_percent.is_finite() {
            return Err(ProbeError::InvalidResponse(
                "load figures must be finite".to_string(),
            ));
        }
        Ok(ProbeReport {
            healthy: self.status.eq_ignore_ascii_case("healthy"),
            metrics: NodeMetrics::new(
                load.cpu_percent,
                load.memory_percent,
                load.active_connections,
            ),
        })
    }
}

/// Probes nodes over HTTP: `GET {endpoint}{probe_path}`.
///
/// Any 2xx answer with a parseable body counts as a report; the node's own
/// `status` field decides whether it is healthy.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    probe_path: String,
}

impl HttpProbe {
    /// Create a new HTTP probe.
    pub fn new(probe_path: impl Into<String>, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client for probes");
                reqwest::Client::new()
            });
        Self::with_client(client, probe_path)
    }

    /// Create a probe around an existing client.
    pub fn with_client(client: reqwest::Client, probe_path: impl Into<String>) -> Self {
        Self {
            client,
            probe_path: probe_path.into(),
        }
    }

    fn url_for(&self, node: &Node) -> String {
        let base = node.endpoint.trim_end_matches('/');
        if self.probe_path.is_empty() {
            base.to_string()
        } else if self.probe_path.starts_with('/') {
            format!("{}{}", base, self.probe_path)
        } else {
            format!("{}/{}", base, self.probe_path)
        }
    }
}

impl HealthProbe for HttpProbe {
    fn probe<'a>(&'a self, node: &'a Node) -> ProbeFuture<'a> {
        Box::pin(async move {
            let url = self.url_for(node);
            let response = self.client.get(&url).send().await.map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Transport(format!("request to {} timed out", url))
                } else {
                    ProbeError::Transport(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProbeError::BadStatus(status.as_u16()));
            }

            let body: HealthResponse = response
                .json()
                .await
                .map_err(|e| ProbeError::InvalidResponse(e.to_string()))?;
            body.into_report()
        })
    }
}
