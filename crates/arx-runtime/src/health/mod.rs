mod monitor;
mod probe;

pub use monitor::{HealthMonitor, HealthMonitorConfig};
pub use probe::HttpProbe;
