//! ARX supervisor
//!
//! Single binary that keeps a fleet of nodes under watch:
//! - Node registry with an optional Postgres mirror
//! - Periodic health probing with failure/recovery thresholds
//! - Nearest-node, lowest-load request routing
//! - Admin API and a realtime event stream

mod runtime;

pub use runtime::{Supervisor, SupervisorBuilder};
