use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arx_core::cluster::{Location, NewNode, Node, NodeId};
use arx_core::routing::{RouteOutcome, RouteRequest};

use super::response::{ApiError, ApiResult};
use super::server::AppState;

/// Capacity given to self-registered nodes.
const SELF_REGISTER_CAPACITY: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct RouteBody {
    pub request_id: String,
    pub coordinates: Location,
    #[serde(default)]
    pub k: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub request_id: String,
    pub routed_to: RoutedTo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoutedTo {
    pub id: NodeId,
    pub name: String,
    pub endpoint: String,
    pub distance: f64,
    pub load_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub location: Location,
    pub endpoint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub nodes: usize,
    pub timestamp: DateTime<Utc>,
}

/// `POST /api/v1/route`
pub async fn route_request(
    State(state): State<AppState>,
    body: Result<Json<RouteBody>, JsonRejection>,
) -> ApiResult<Json<RouteResponse>> {
    let Json(body) = body?;
    if body.request_id.trim().is_empty() {
        return Err(ApiError::validation("request_id is required"));
    }

    let mut request = RouteRequest::new(body.coordinates).with_request_id(&body.request_id);
    request.k = body.k;

    match state.routing.route(&request).await? {
        RouteOutcome::Selected(decision) => Ok(Json(RouteResponse {
            request_id: body.request_id,
            routed_to: RoutedTo {
                id: decision.node.id,
                name: decision.node.name,
                endpoint: decision.node.endpoint,
                distance: decision.distance,
                load_score: decision.load_score,
            },
        })),
        RouteOutcome::Unavailable => Err(ApiError::unavailable("No healthy nodes available")),
    }
}

/// `GET /api/v1/nodes`
pub async fn list_nodes(State(state): State<AppState>) -> Json<Vec<Node>> {
    Json(state.registry.list(None).await)
}

/// `POST /api/v1/nodes/register`
///
/// Self-registration by a node: starts `active` with the default capacity.
pub async fn register_node(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Node>)> {
    let Json(body) = body?;
    let new = NewNode::new(
        body.name,
        body.location,
        body.endpoint,
        SELF_REGISTER_CAPACITY,
    )
    .activated();
    let node = state.registry.register(new).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        nodes: state.registry.len().await,
        timestamp: Utc::now(),
    })
}
