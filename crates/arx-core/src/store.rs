use std::future::Future;
use std::pin::Pin;

use crate::cluster::Node;
use crate::error::Result;
use crate::event::Event;

/// Future returned by [`NodeStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence collaborator.
///
/// The registry is authoritative at runtime; the store only hydrates it at
/// startup and receives events for audit afterwards.
pub trait NodeStore: Send + Sync {
    /// All persisted nodes, in registration order.
    fn load_all_nodes(&self) -> StoreFuture<'_, Vec<Node>>;

    /// Persist the effect of an event.
    fn record_event<'a>(&'a self, event: &'a Event) -> StoreFuture<'a, ()>;

    /// Make the persisted node set exactly `nodes`: upsert every listed
    /// node and remove any other.
    fn sync_nodes<'a>(&'a self, nodes: &'a [Node]) -> StoreFuture<'a, ()>;
}
