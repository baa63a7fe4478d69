mod probe;
mod state;

pub use probe::{HealthProbe, HealthProbeResult, ProbeError, ProbeFuture, ProbeReport};
pub use state::{HealthCounters, HealthThresholds, HealthTransition};
