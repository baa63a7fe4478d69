//! Domain model and pure algorithms for the fleet supervisor: nodes, events,
//! routing math, the health state machine, configuration and the contracts
//! of external collaborators.

pub mod cluster;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod routing;
pub mod store;

pub use cluster::{Location, NewNode, Node, NodeId, NodeMetrics, NodePatch, NodeStatus};
pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use event::{Event, EventKind, OverflowPolicy};
pub use routing::{RouteOutcome, RouteRequest, RoutingDecision};
pub use store::NodeStore;
