use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use arx_core::cluster::{Location, Node, NodeId, NodeMetrics, NodeStatus};
use arx_core::error::{Result, SupervisorError};
use arx_core::event::{Event, RouteDecided};
use arx_core::store::{NodeStore, StoreFuture};

/// Postgres-backed [`NodeStore`].
pub struct PgNodeStore {
    pool: PgPool,
}

impl PgNodeStore {
    /// Create a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_nodes(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, location_x, location_y, endpoint, capacity, status,
                   cpu_usage, memory_usage, active_connections,
                   last_health_check, created_at, updated_at
            FROM nodes
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            match node_from_row(&row) {
                Ok(node) => nodes.push(node),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable node row"),
            }
        }
        Ok(nodes)
    }

    async fn upsert_node(&self, node: &Node) -> Result<()> {
        upsert_query(node)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Replace the node table with `nodes` in one transaction.
    async fn replace_nodes(&self, nodes: &[Node]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for node in nodes {
            upsert_query(node)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        let keep: Vec<Uuid> = nodes.iter().map(|n| n.id.as_uuid()).collect();
        sqlx::query("DELETE FROM nodes WHERE NOT (id = ANY($1))")
            .bind(keep)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_node(&self, id: NodeId) -> Result<()> {
        sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_metrics(&self, node: &Node) -> Result<()> {
        let recorded_at = node.last_health_check.unwrap_or(node.updated_at);
        sqlx::query(
            r#"
            INSERT INTO system_metrics (node_id, metric_type, value, recorded_at)
            VALUES ($1, 'cpu_usage', $2, $5),
                   ($1, 'memory_usage', $3, $5),
                   ($1, 'active_connections', $4, $5)
            "#,
        )
        .bind(node.id.as_uuid())
        .bind(node.metrics.cpu_usage)
        .bind(node.metrics.memory_usage)
        .bind(f64::from(node.metrics.active_connections))
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_route(&self, route: &RouteDecided) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routing_requests (
                request_id, client_x, client_y, routed_node_id, distance, load_score, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(route.request_id.as_deref())
        .bind(route.coordinates.x)
        .bind(route.coordinates.y)
        .bind(route.node_id.as_uuid())
        .bind(route.distance)
        .bind(route.load_score)
        .bind(route.decided_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

impl NodeStore for PgNodeStore {
    fn load_all_nodes(&self) -> StoreFuture<'_, Vec<Node>> {
        Box::pin(self.fetch_nodes())
    }

    fn record_event<'a>(&'a self, event: &'a Event) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            match event {
                Event::NodeRegistered(node) | Event::NodeUpdated(node) => {
                    self.upsert_node(node).await
                }
                Event::NodeHealthChanged(change) => {
                    self.upsert_node(&change.node).await?;
                    self.insert_metrics(&change.node).await
                }
                Event::NodeDeleted { node_id } => self.delete_node(*node_id).await,
                Event::RouteDecided(route) => self.insert_route(route).await,
                _ => Ok(()),
            }
        })
    }

    fn sync_nodes<'a>(&'a self, nodes: &'a [Node]) -> StoreFuture<'a, ()> {
        Box::pin(self.replace_nodes(nodes))
    }
}

fn upsert_query(node: &Node) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO nodes (
            id, name, location_x, location_y, endpoint, capacity, status,
            cpu_usage, memory_usage, active_connections,
            last_health_check, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            location_x = EXCLUDED.location_x,
            location_y = EXCLUDED.location_y,
            endpoint = EXCLUDED.endpoint,
            capacity = EXCLUDED.capacity,
            status = EXCLUDED.status,
            cpu_usage = EXCLUDED.cpu_usage,
            memory_usage = EXCLUDED.memory_usage,
            active_connections = EXCLUDED.active_connections,
            last_health_check = EXCLUDED.last_health_check,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(node.id.as_uuid())
    .bind(&node.name)
    .bind(node.location.x)
    .bind(node.location.y)
    .bind(&node.endpoint)
    .bind(i32::try_from(node.capacity).unwrap_or(i32::MAX))
    .bind(node.status.as_str())
    .bind(node.metrics.cpu_usage)
    .bind(node.metrics.memory_usage)
    .bind(i32::try_from(node.metrics.active_connections).unwrap_or(i32::MAX))
    .bind(node.last_health_check)
    .bind(node.created_at)
    .bind(node.updated_at)
}

fn node_from_row(row: &PgRow) -> Result<Node> {
    let id: Uuid = row.try_get("id").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let status = NodeStatus::from_str(&status).ok_or_else(|| {
        SupervisorError::Database(format!("node {} has unknown status '{}'", id, status))
    })?;
    let capacity: i32 = row.try_get("capacity").map_err(db_err)?;
    let capacity = u32::try_from(capacity)
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| {
            SupervisorError::Database(format!("node {} has invalid capacity {}", id, capacity))
        })?;
    let connections: i32 = row.try_get("active_connections").map_err(db_err)?;

    Ok(Node {
        id: NodeId::from_uuid(id),
        name: row.try_get("name").map_err(db_err)?,
        location: Location::new(
            row.try_get("location_x").map_err(db_err)?,
            row.try_get("location_y").map_err(db_err)?,
        ),
        endpoint: row.try_get("endpoint").map_err(db_err)?,
        capacity,
        status,
        metrics: NodeMetrics::new(
            row.try_get("cpu_usage").map_err(db_err)?,
            row.try_get("memory_usage").map_err(db_err)?,
            u32::try_from(connections).unwrap_or(0),
        ),
        last_health_check: row.try_get("last_health_check").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> SupervisorError {
    SupervisorError::Database(e.to_string())
}
