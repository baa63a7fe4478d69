//! Audit schema.
//!
//! Every statement is idempotent so `migrate` can run on each startup.

use sqlx::PgPool;

use arx_core::error::{Result, SupervisorError};

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    location_x DOUBLE PRECISION NOT NULL,
    location_y DOUBLE PRECISION NOT NULL,
    endpoint VARCHAR(512) NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity > 0),
    status VARCHAR(32) NOT NULL DEFAULT 'inactive',
    cpu_usage DOUBLE PRECISION NOT NULL DEFAULT 0,
    memory_usage DOUBLE PRECISION NOT NULL DEFAULT 0,
    active_connections INTEGER NOT NULL DEFAULT 0,
    last_health_check TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_nodes_status ON nodes(status);

CREATE TABLE IF NOT EXISTS routing_requests (
    id BIGSERIAL PRIMARY KEY,
    request_id VARCHAR(255),
    client_x DOUBLE PRECISION NOT NULL,
    client_y DOUBLE PRECISION NOT NULL,
    routed_node_id UUID,
    distance DOUBLE PRECISION NOT NULL,
    load_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_routing_requests_node ON routing_requests(routed_node_id);
CREATE INDEX IF NOT EXISTS idx_routing_requests_created ON routing_requests(created_at);

CREATE TABLE IF NOT EXISTS system_metrics (
    id BIGSERIAL PRIMARY KEY,
    node_id UUID NOT NULL,
    metric_type VARCHAR(64) NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_system_metrics_node_time ON system_metrics(node_id, recorded_at);
"#;

/// Create the audit tables if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(|e| SupervisorError::Database(format!("Migration failed: {}", e)))?;

    tracing::info!("Database schema up to date");
    Ok(())
}
