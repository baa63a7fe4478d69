mod node;

pub use node::{Location, NewNode, Node, NodeCounts, NodeId, NodeMetrics, NodePatch, NodeStatus};
