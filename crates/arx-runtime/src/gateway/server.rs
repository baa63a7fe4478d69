use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::{HeaderName, HeaderValue},
    middleware,
    routing::{any, get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use arx_core::config::ServerConfig;
use arx_core::error::{Result, SupervisorError};

use super::admin;
use super::public;
use super::websocket::realtime_handler;
use crate::cluster::NodeRegistry;
use crate::events::EventHub;
use crate::routing::RoutingEngine;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors_origins: config.cors_origins.clone(),
        }
    }
}

/// Handles shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub routing: Arc<RoutingEngine>,
    pub events: Arc<EventHub>,
}

/// Gateway HTTP server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        let cors = if self.config.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let public = Router::new()
            .route("/route", post(public::route_request))
            .route("/nodes", get(public::list_nodes))
            .route("/nodes/register", post(public::register_node))
            .route("/health", get(public::health));

        let admin = Router::new()
            .route("/nodes", get(admin::list_nodes).post(admin::create_node))
            .route(
                "/nodes/{id}",
                get(admin::get_node)
                    .patch(admin::update_node)
                    .put(admin::update_node)
                    .delete(admin::delete_node),
            )
            .route("/dashboard/metrics", get(admin::dashboard_metrics))
            .route("/realtime", any(realtime_handler));

        Router::new()
            .nest("/api/v1", public)
            .nest("/admin/api/v1", admin)
            .with_state(self.state.clone())
            .layer(cors)
            .layer(middleware::from_fn(tracing_middleware))
    }

    /// Get the socket address to bind to.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                SupervisorError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.addr()?;
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Gateway listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Attach a request id span to every request and echo the id back.
async fn tracing_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    let request_id = req
        .headers()
        .get(&header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id = %request_id,
    );

    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(header, value);
    }
    response
}
