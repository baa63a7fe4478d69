mod algorithm;

pub use algorithm::{
    effective_k, k_nearest, load_score, select_best, Candidate, LoadWeights, RouteOutcome,
    RouteRequest, RoutingDecision,
};
