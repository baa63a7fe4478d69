use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use arx_core::cluster::{Location, NewNode, Node, NodeId, NodePatch, NodeStatus};

use super::response::{ApiError, ApiResult};
use super::server::AppState;

/// Capacity used when an admin creates a node without one.
const DEFAULT_CAPACITY: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateNodeBody {
    pub name: String,
    pub location: Location,
    pub endpoint: String,
    #[serde(default)]
    pub capacity: Option<i64>,
    /// Start `active` instead of `inactive`.
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub active_nodes: usize,
    pub unhealthy_nodes: usize,
    pub inactive_nodes: usize,
    pub subscribers: usize,
    pub events_published: u64,
    pub events_dropped: u64,
}

/// `GET /admin/api/v1/nodes[?status=...]`
pub async fn list_nodes(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Node>>> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            NodeStatus::from_str(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status '{}'", raw)))?,
        ),
    };
    Ok(Json(state.registry.list(status).await))
}

/// `POST /admin/api/v1/nodes`
pub async fn create_node(
    State(state): State<AppState>,
    body: Result<Json<CreateNodeBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Node>)> {
    let Json(body) = body?;
    let mut new = NewNode::new(
        body.name,
        body.location,
        body.endpoint,
        body.capacity.unwrap_or(DEFAULT_CAPACITY),
    );
    new.activate = body.activate;

    let node = state.registry.register(new).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// `GET /admin/api/v1/nodes/{id}`
pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Node>> {
    let id = NodeId::parse(&id)?;
    Ok(Json(state.registry.get(id).await?))
}

/// `PATCH|PUT /admin/api/v1/nodes/{id}`
///
/// Both verbs have PATCH semantics: absent fields stay unchanged.
pub async fn update_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NodePatch>, JsonRejection>,
) -> ApiResult<Json<Node>> {
    let id = NodeId::parse(&id)?;
    let Json(patch) = body?;
    Ok(Json(state.registry.update_fields(id, patch).await?))
}

/// `DELETE /admin/api/v1/nodes/{id}`
pub async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = NodeId::parse(&id)?;
    state.registry.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /admin/api/v1/dashboard/metrics`
pub async fn dashboard_metrics(State(state): State<AppState>) -> Json<DashboardMetrics> {
    let counts = state.registry.counts().await;
    let stats = state.events.stats();
    Json(DashboardMetrics {
        total_nodes: counts.total,
        healthy_nodes: counts.healthy,
        active_nodes: counts.active,
        unhealthy_nodes: counts.unhealthy,
        inactive_nodes: counts.inactive,
        subscribers: stats.subscribers,
        events_published: stats.published,
        events_dropped: stats.dropped,
    })
}
