//! HTTP and WebSocket surface over the registry, routing engine and hub.

mod admin;
mod public;
mod response;
mod server;
mod websocket;

pub use admin::DashboardMetrics;
pub use public::{HealthResponse, RouteResponse, RoutedTo};
pub use response::{ApiError, ApiResult};
pub use server::{AppState, GatewayConfig, GatewayServer};
pub use websocket::{event_frame, realtime_handler};
