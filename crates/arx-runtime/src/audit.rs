use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use arx_core::store::NodeStore;

use crate::cluster::NodeRegistry;
use crate::events::Subscription;

/// Hands every hub event to the persistence store.
///
/// Runs as an ordinary hub subscriber, so a slow or failing store only
/// costs audit events, never routing or health latency. The node table is
/// kept whole regardless: when events were shed on the way here, or a write
/// failed, the table is rewritten from a registry snapshot.
pub struct AuditForwarder {
    store: Arc<dyn NodeStore>,
    registry: Arc<NodeRegistry>,
    subscription: Subscription,
    seen_losses: u64,
}

impl AuditForwarder {
    /// Create a new forwarder over the registry's event hub.
    ///
    /// Subscribes immediately; events published before this call are not
    /// seen.
    pub fn new(store: Arc<dyn NodeStore>, registry: Arc<NodeRegistry>) -> Self {
        let subscription = registry.events().subscribe();
        let seen_losses = registry.events().stats().rejected;
        Self {
            store,
            registry,
            subscription,
            seen_losses,
        }
    }

    /// Forward events until cancelled or the hub shuts down.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::debug!(subscriber = %self.subscription.id(), "Audit forwarder started");
        let mut failures: u64 = 0;
        let mut stale = false;

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if let Err(e) = self.store.record_event(&event).await {
                failures += 1;
                stale = true;
                tracing::warn!(
                    kind = %event.kind(),
                    node_id = %event.node_id(),
                    error = %e,
                    "Failed to record event"
                );
            }

            let losses = self.losses();
            if losses != self.seen_losses {
                tracing::warn!(
                    lost = losses - self.seen_losses,
                    "Events lost before reaching the store"
                );
                self.seen_losses = losses;
                stale = true;
            }

            if stale {
                stale = !self.resync().await;
            }
        }

        if stale {
            self.resync().await;
        }

        tracing::debug!(
            failures,
            dropped = self.subscription.dropped(),
            "Audit forwarder stopped"
        );
    }

    /// Events this forwarder can never see: shed from its own buffer or
    /// refused by the hub at publish time.
    fn losses(&self) -> u64 {
        self.subscription.dropped() + self.registry.events().stats().rejected
    }

    /// Rewrite the stored node set from the registry. Returns success.
    async fn resync(&self) -> bool {
        let nodes = self.registry.list(None).await;
        match self.store.sync_nodes(&nodes).await {
            Ok(()) => {
                tracing::info!(nodes = nodes.len(), "Node table resynchronized");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resynchronize node table");
                false
            }
        }
    }
}
