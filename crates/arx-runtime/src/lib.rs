//! Runtime of the fleet supervisor: the live node registry, the health
//! monitor, the routing engine, the event hub and the surfaces around them.

pub mod audit;
pub mod cluster;
pub mod db;
pub mod events;
pub mod gateway;
pub mod health;
pub mod routing;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::AuditForwarder;
pub use cluster::NodeRegistry;
pub use events::{EventHub, HubConfig, Subscription};
pub use health::{HealthMonitor, HealthMonitorConfig, HttpProbe};
pub use routing::{RoutingEngine, RoutingEngineConfig};
