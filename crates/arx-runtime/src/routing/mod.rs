mod engine;

pub use engine::{RoutingEngine, RoutingEngineConfig};
