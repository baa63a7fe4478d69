//! Process wiring for the supervisor.
//!
//! Builds the live components from a [`SupervisorConfig`] and runs them
//! side by side:
//! - Event hub dispatch loop
//! - Health monitor
//! - HTTP gateway (public, admin and realtime surfaces)
//! - Audit forwarder into the node store, when one is configured

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use arx_core::config::SupervisorConfig;
use arx_core::error::{Result, SupervisorError};
use arx_core::health::HealthProbe;
use arx_core::store::NodeStore;

use arx_runtime::db::{migrate, Database, PgNodeStore};
use arx_runtime::gateway::{AppState, GatewayConfig, GatewayServer};
use arx_runtime::{
    AuditForwarder, EventHub, HealthMonitor, HealthMonitorConfig, HttpProbe, HubConfig,
    NodeRegistry, RoutingEngine, RoutingEngineConfig,
};

/// The supervisor process.
pub struct Supervisor {
    config: SupervisorConfig,
    events: Arc<EventHub>,
    registry: Arc<NodeRegistry>,
    routing: Arc<RoutingEngine>,
    monitor: Arc<HealthMonitor>,
    store: Option<Arc<dyn NodeStore>>,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Create a new builder for configuring the supervisor.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Get the node registry.
    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    /// Get the event hub.
    pub fn events(&self) -> Arc<EventHub> {
        self.events.clone()
    }

    /// Get the routing engine.
    pub fn routing(&self) -> Arc<RoutingEngine> {
        self.routing.clone()
    }

    /// Token that stops [`Supervisor::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until Ctrl-C or [`Supervisor::shutdown`].
    pub async fn run(self) -> Result<()> {
        tracing::info!("Supervisor starting");

        let gateway = GatewayServer::new(
            GatewayConfig::from(&self.config.server),
            AppState {
                registry: self.registry.clone(),
                routing: self.routing.clone(),
                events: self.events.clone(),
            },
        );
        let addr = gateway.addr()?;

        let (store, db) = self.open_store().await?;
        if let Some(store) = &store {
            let nodes = store.load_all_nodes().await?;
            let restored = self.registry.restore(nodes).await;
            tracing::info!(restored, "Registry hydrated from store");
        }

        let hub_task = self.events.start()?;

        // Subscribed before anything can publish.
        let audit_stop = CancellationToken::new();
        let audit_task = store.map(|store| {
            let forwarder = AuditForwarder::new(store, self.registry.clone());
            tokio::spawn(forwarder.run(audit_stop.clone()))
        });

        let monitor_task = {
            let monitor = self.monitor.clone();
            let token = self.shutdown.child_token();
            tokio::spawn(async move { monitor.run(token).await })
        };

        let gateway_task: JoinHandle<Result<()>> = {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let result = gateway.run(shutdown.child_token()).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Gateway failed, shutting down");
                    shutdown.cancel();
                }
                result
            })
        };

        let nodes = self.registry.len().await;
        tracing::info!(
            %addr,
            nodes,
            persistence = db.is_some(),
            "Supervisor started"
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("Received shutdown notification");
            }
        }

        tracing::info!("Starting graceful shutdown");
        self.shutdown.cancel();

        if let Err(e) = monitor_task.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        // Closing the hub ends realtime streams, which lets the gateway drain.
        self.events.shutdown();
        if let Err(e) = hub_task.await {
            tracing::error!(error = %e, "Event hub task failed");
        }

        let gateway_result = match gateway_task.await {
            Ok(result) => result,
            Err(e) => Err(SupervisorError::Internal(format!(
                "gateway task failed: {}",
                e
            ))),
        };

        if let Some(mut task) = audit_task {
            let grace = self.config.health.shutdown_grace();
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                tracing::warn!("Audit forwarder did not drain in time");
                audit_stop.cancel();
                let _ = task.await;
            }
        }

        if let Some(db) = db {
            db.close().await;
        }

        tracing::info!("Supervisor stopped");
        gateway_result
    }

    /// Resolve the node store: an injected one, Postgres, or none.
    async fn open_store(&self) -> Result<(Option<Arc<dyn NodeStore>>, Option<Database>)> {
        if let Some(store) = &self.store {
            return Ok((Some(store.clone()), None));
        }
        if !self.config.database.is_enabled() {
            return Ok((None, None));
        }

        let db = Database::from_config(&self.config.database).await?;
        tracing::info!("Connected to database");
        if let Err(e) = migrate(db.pool()).await {
            db.close().await;
            return Err(e);
        }

        let store: Arc<dyn NodeStore> = Arc::new(PgNodeStore::new(db.pool().clone()));
        Ok((Some(store), Some(db)))
    }
}

/// Builder for configuring the supervisor.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<SupervisorConfig>,
    probe: Option<Arc<dyn HealthProbe>>,
    store: Option<Arc<dyn NodeStore>>,
}

impl SupervisorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the HTTP probe.
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Use `store` instead of the configured database.
    pub fn store(mut self, store: Arc<dyn NodeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the supervisor.
    pub fn build(self) -> Result<Supervisor> {
        let config = self
            .config
            .ok_or_else(|| SupervisorError::Config("Configuration is required".to_string()))?;
        config.validate()?;

        let events = Arc::new(EventHub::new(HubConfig::from(&config.events)));
        let registry = Arc::new(NodeRegistry::new(events.clone()));
        let routing = Arc::new(RoutingEngine::new(
            registry.clone(),
            events.clone(),
            RoutingEngineConfig::from(&config.routing),
        )?);

        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(HttpProbe::new(
                config.health.probe_path.clone(),
                connect_timeout(config.health.timeout()),
            ))
        });
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            probe,
            HealthMonitorConfig::from(&config.health),
        ));

        Ok(Supervisor {
            config,
            events,
            registry,
            routing,
            monitor,
            store: self.store,
            shutdown: CancellationToken::new(),
        })
    }
}

/// Connect budget for probes; the monitor enforces the overall timeout.
fn connect_timeout(probe_timeout: Duration) -> Duration {
    probe_timeout.min(Duration::from_secs(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    use arx_core::cluster::{Location, NewNode, Node, NodeId, NodeMetrics, NodeStatus};
    use arx_core::event::Event;
    use arx_runtime::testing::{eventually, healthy, MemoryNodeStore, ScriptedProbe};

    fn local_config() -> SupervisorConfig {
        let mut config = SupervisorConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.health.check_interval_secs = 1;
        config.health.recovery_threshold = 1;
        config.health.shutdown_grace_secs = 1;
        config
    }

    fn stored_node(name: &str, endpoint: &str) -> Node {
        Node::from_new(
            NodeId::new(),
            NewNode::new(name, Location::new(1.0, 1.0), endpoint, 10).activated(),
        )
        .unwrap()
    }

    async fn stop(supervisor_task: JoinHandle<Result<()>>, token: CancellationToken) {
        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), supervisor_task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_builder_requires_config() {
        let result = Supervisor::builder().build();
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = SupervisorConfig::default();
        config.routing.cpu_weight = 0.9;
        assert!(Supervisor::builder().config(config).build().is_err());

        let mut config = SupervisorConfig::default();
        config.health.failure_threshold = 0;
        assert!(Supervisor::builder().config(config).build().is_err());
    }

    #[test]
    fn test_connect_timeout_is_capped() {
        assert_eq!(
            connect_timeout(Duration::from_secs(5)),
            Duration::from_secs(2)
        );
        assert_eq!(
            connect_timeout(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_run_in_memory_and_shutdown() {
        let supervisor = Supervisor::builder()
            .config(local_config())
            .probe(Arc::new(ScriptedProbe::new()))
            .build()
            .unwrap();
        let token = supervisor.shutdown_token();
        let events = supervisor.events();

        let task = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(events.subscriber_count(), 0);

        stop(task, token).await;
        // The hub is closed once run returns.
        assert!(events.subscribe().recv().await.is_none());
    }

    #[tokio::test]
    async fn test_restores_store_and_forwards_events() {
        let seeded = stored_node("seed", "http://seed");
        let store = MemoryNodeStore::with_nodes(vec![seeded.clone()]);
        let probe = Arc::new(ScriptedProbe::new());
        probe.script(
            "http://seed",
            [healthy(NodeMetrics::new(20.0, 30.0, 1))],
        );

        let supervisor = Supervisor::builder()
            .config(local_config())
            .probe(probe.clone())
            .store(store.clone())
            .build()
            .unwrap();
        let token = supervisor.shutdown_token();
        let registry = supervisor.registry();

        let task = tokio::spawn(supervisor.run());

        // The first probe round marks the restored node healthy and the
        // resulting event lands in the store.
        eventually(Duration::from_secs(3), || {
            store.events().iter().any(|e| {
                matches!(e, Event::NodeHealthChanged(change)
                    if change.node.id == seeded.id && change.current == NodeStatus::Healthy)
            })
        })
        .await
        .unwrap();
        assert!(probe.calls("http://seed") >= 1);
        assert_eq!(registry.get(seeded.id).await.unwrap().status, NodeStatus::Healthy);

        let added = registry
            .register(NewNode::new("added", Location::new(5.0, 5.0), "http://added", 10))
            .await
            .unwrap();
        eventually(Duration::from_secs(1), || {
            store.nodes().iter().any(|n| n.id == added.id)
        })
        .await
        .unwrap();

        stop(task, token).await;
        assert_eq!(store.nodes().len(), 2);
    }

    #[tokio::test]
    async fn test_gateway_bind_failure_stops_run() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = local_config();
        config.server.port = port;
        let supervisor = Supervisor::builder()
            .config(config)
            .probe(Arc::new(ScriptedProbe::new()))
            .build()
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .unwrap();
        assert!(result.is_err());
        drop(listener);
    }

    #[tokio::test]
    async fn test_invalid_host_fails_before_serving() {
        let mut config = local_config();
        config.server.host = "not a host".to_string();
        let supervisor = Supervisor::builder()
            .config(config)
            .probe(Arc::new(ScriptedProbe::new()))
            .build()
            .unwrap();
        assert!(matches!(
            supervisor.run().await,
            Err(SupervisorError::Config(_))
        ));
    }
}
