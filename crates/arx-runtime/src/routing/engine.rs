use std::sync::Arc;

use chrono::Utc;

use arx_core::config::RoutingConfig;
use arx_core::error::{Result, SupervisorError};
use arx_core::event::{Event, RouteDecided};
use arx_core::routing::{
    effective_k, k_nearest, select_best, LoadWeights, RouteOutcome, RouteRequest, RoutingDecision,
};

use crate::cluster::NodeRegistry;
use crate::events::EventHub;

/// Routing engine configuration.
#[derive(Debug, Clone)]
pub struct RoutingEngineConfig {
    /// Candidate pool size when the request does not give one.
    pub default_k: i64,
    pub weights: LoadWeights,
}

impl Default for RoutingEngineConfig {
    fn default() -> Self {
        Self::from(&RoutingConfig::default())
    }
}

impl From<&RoutingConfig> for RoutingEngineConfig {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            default_k: config.k_nearest,
            weights: config.weights(),
        }
    }
}

/// Maps request coordinates to the best healthy node.
pub struct RoutingEngine {
    registry: Arc<NodeRegistry>,
    events: Arc<EventHub>,
    config: RoutingEngineConfig,
}

impl RoutingEngine {
    /// Create a new routing engine.
    pub fn new(
        registry: Arc<NodeRegistry>,
        events: Arc<EventHub>,
        config: RoutingEngineConfig,
    ) -> Result<Self> {
        config.weights.validate()?;
        Ok(Self {
            registry,
            events,
            config,
        })
    }

    pub fn config(&self) -> &RoutingEngineConfig {
        &self.config
    }

    /// Pick a node for the request.
    ///
    /// Candidates are the `k` healthy nodes nearest to the request, taken
    /// from one registry snapshot; the least loaded one wins. Equal
    /// distances keep registration order and equal scores keep the nearer
    /// candidate. No healthy node yields [`RouteOutcome::Unavailable`].
    pub async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome> {
        if !request.coordinates.is_finite() {
            return Err(SupervisorError::Validation(
                "coordinates must be finite".to_string(),
            ));
        }

        let k = effective_k(request.k.unwrap_or(self.config.default_k));
        let healthy = self.registry.healthy_nodes().await;
        let candidates = k_nearest(&healthy, request.coordinates, k);

        let Some((best, load_score)) = select_best(&candidates, &self.config.weights) else {
            tracing::debug!(
                request_id = request.request_id.as_deref().unwrap_or("-"),
                x = request.coordinates.x,
                y = request.coordinates.y,
                "No healthy node available"
            );
            return Ok(RouteOutcome::Unavailable);
        };

        let decision = RoutingDecision {
            request_id: request.request_id.clone(),
            coordinates: request.coordinates,
            node: best.node.clone(),
            distance: best.distance,
            load_score,
            decided_at: Utc::now(),
        };

        tracing::debug!(
            request_id = decision.request_id.as_deref().unwrap_or("-"),
            node_id = %decision.node.id,
            distance = decision.distance,
            load_score = decision.load_score,
            candidates = candidates.len(),
            "Route decided"
        );
        self.events
            .publish(Event::RouteDecided(RouteDecided::from(&decision)));

        Ok(RouteOutcome::Selected(decision))
    }
}
