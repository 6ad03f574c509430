//! Database liveness probe

use std::time::Instant;

use chrono::{DateTime, Utc};
use ks_core::errors::{DbError, DbResult};
use ks_shared::types::{HealthStatus, ServiceHealth};
use serde::{Deserialize, Serialize};
use sqlx::Executor;

use super::backend::{LIST_TABLES_QUERY, SERVER_INFO_QUERY};
use super::error::classify;
use super::pool::{ConnectionPool, PoolStatistics};

const NOT_INITIALIZED: &str = "Database not initialized";

/// Outcome of one [`HealthProbe::check`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn healthy(latency_ms: f64) -> Self {
        Self {
            healthy: true,
            latency_ms: Some(latency_ms),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }
}

impl From<HealthReport> for ServiceHealth {
    fn from(report: HealthReport) -> Self {
        ServiceHealth {
            status: if report.healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: report.error,
            response_time_ms: report.latency_ms,
        }
    }
}

/// Server identity plus a snapshot of the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseInfo {
    pub version: String,
    pub database: String,
    /// Login of the session; `None` for embedded engines
    pub user: Option<String>,
    /// Server-side sessions on this database; `None` for embedded engines
    pub active_connections: Option<i64>,
    pub pool: PoolStatistics,
}

type ServerInfoRow = (String, String, Option<String>, Option<i64>);

/// Round-trips a trivial query through the pool
///
/// Never fails: every problem, including a missing or disposed pool, comes
/// back as an unhealthy [`HealthReport`].
#[derive(Debug, Clone, Default)]
pub struct HealthProbe {
    pool: Option<ConnectionPool>,
}

impl HealthProbe {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// Probe with no pool; every check reports "Database not initialized"
    pub fn uninitialized() -> Self {
        Self::default()
    }

    fn live_pool(&self) -> DbResult<&ConnectionPool> {
        match &self.pool {
            Some(pool) if !pool.is_disposed() => Ok(pool),
            _ => Err(DbError::invalid_state(NOT_INITIALIZED)),
        }
    }

    /// Server version, database name, user and pool counters
    pub async fn database_info(&self) -> DbResult<DatabaseInfo> {
        let pool = self.live_pool()?;
        let mut conn = pool.acquire().await?;

        let row = sqlx::query_as::<_, ServerInfoRow>(SERVER_INFO_QUERY)
            .fetch_one(&mut *conn)
            .await;
        pool.release(conn, row.is_ok()).await;

        let (version, database, user, active_connections) = row.map_err(|e| {
            let err = classify(e);
            tracing::error!(error = %err, "Failed to retrieve database info");
            err
        })?;

        tracing::debug!(database = %database, "Retrieved database info");
        Ok(DatabaseInfo {
            version,
            database,
            user,
            active_connections,
            pool: pool.statistics(),
        })
    }

    /// Names of the tables in the current database, sorted
    pub async fn tables(&self) -> DbResult<Vec<String>> {
        let pool = self.live_pool()?;
        let mut conn = pool.acquire().await?;

        let rows = sqlx::query_as::<_, (String,)>(LIST_TABLES_QUERY)
            .fetch_all(&mut *conn)
            .await;
        pool.release(conn, rows.is_ok()).await;

        let tables: Vec<String> = rows
            .map_err(|e| {
                let err = classify(e);
                tracing::error!(error = %err, "Failed to retrieve database tables");
                err
            })?
            .into_iter()
            .map(|(name,)| name)
            .collect();

        tracing::debug!(count = tables.len(), "Retrieved database tables");
        Ok(tables)
    }

    pub async fn check(&self) -> HealthReport {
        let pool = match &self.pool {
            Some(pool) if !pool.is_disposed() => pool,
            _ => return HealthReport::unhealthy(NOT_INITIALIZED),
        };

        tracing::debug!("Performing database health check");
        let started = Instant::now();

        let mut conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Database health check failed: {}", e);
                return HealthReport::unhealthy(e.to_string());
            }
        };

        match (&mut *conn).execute("SELECT 1").await {
            Ok(_) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                pool.release(conn, true).await;
                tracing::debug!(latency_ms, "Database health check passed");
                HealthReport::healthy(latency_ms)
            }
            Err(e) => {
                pool.release(conn, false).await;
                tracing::error!("Database health check failed: {}", e);
                HealthReport::unhealthy(e.to_string())
            }
        }
    }
}
