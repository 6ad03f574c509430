//! Database connection pool management
//!
//! [`ConnectionPool`] wraps the SQLx pool with the sizing, recycling and
//! pre-ping policy from [`DatabaseConfig`], and hands out [`UnitOfWork`]s.
//! The pool is a cheap clonable handle; all clones share one set of
//! connections and one disposed flag.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use ks_core::errors::{BoxError, DbError, DbResult, ErrorCode};
use ks_shared::config::DatabaseConfig;
use log::LevelFilter;
use serde::Serialize;
use sqlx::pool::{PoolConnection, PoolOptions};
use sqlx::{ConnectOptions, Connection, Executor, Pool};
use tracing::{debug, info, warn};

use super::backend::{self, Db, DbConnectOptions};
use super::error::{absorb, classify};
use super::unit_of_work::UnitOfWork;

/// Clonable handle to a bounded pool of database connections
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool<Db>,
    settings: Arc<DatabaseConfig>,
    disposed: Arc<AtomicBool>,
}

impl ConnectionPool {
    /// Create a pool that opens connections on first use
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// `DbError::Database` when the URL or settings are invalid.
    pub fn new(settings: DatabaseConfig) -> DbResult<Self> {
        let options = connect_options(&settings)?;
        let pool = pool_options(&settings).connect_lazy_with(options);
        Ok(Self::from_parts(pool, settings))
    }

    /// Create a pool and open its first connection eagerly
    ///
    /// # Example
    /// ```no_run
    /// use ks_infra::database::ConnectionPool;
    /// use ks_shared::config::DatabaseConfig;
    ///
    /// async fn open() -> Result<ConnectionPool, Box<dyn std::error::Error>> {
    ///     let settings = DatabaseConfig::new("sqlite://app.db?mode=rwc").with_pool_size(5);
    ///     Ok(ConnectionPool::connect(settings).await?)
    /// }
    /// ```
    pub async fn connect(settings: DatabaseConfig) -> DbResult<Self> {
        let options = connect_options(&settings)?;
        let pool = pool_options(&settings)
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create database pool: {}", e);
                classify(e)
            })?;
        Ok(Self::from_parts(pool, settings))
    }

    fn from_parts(pool: Pool<Db>, settings: DatabaseConfig) -> Self {
        info!(
            backend = backend::BACKEND_NAME,
            url = %settings.masked_url(),
            pool_size = settings.pool_size,
            max_overflow = settings.max_overflow,
            "Database connection pool created"
        );
        Self {
            pool,
            settings: Arc::new(settings),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &DatabaseConfig {
        &self.settings
    }

    /// Underlying SQLx pool, for migrations and ad-hoc queries
    pub fn inner(&self) -> &Pool<Db> {
        &self.pool
    }

    /// Check out one connection
    ///
    /// # Errors
    /// * `DbError::PoolExhausted` if none became free within the acquire timeout
    /// * `DbError::InvalidState` once the pool has been disposed
    pub async fn acquire(&self) -> DbResult<PoolConnection<Db>> {
        if self.is_disposed() {
            return Err(DbError::invalid_state("connection pool has been disposed"));
        }
        match self.pool.acquire().await {
            Ok(conn) => Ok(conn),
            Err(sqlx::Error::PoolTimedOut) => {
                warn!(
                    timeout_ms = self.settings.acquire_timeout_ms,
                    "{}",
                    self.statistics()
                );
                Err(DbError::PoolExhausted {
                    timeout_ms: self.settings.acquire_timeout_ms,
                })
            }
            Err(e) => Err(classify(e)),
        }
    }

    /// Return a connection to the pool
    ///
    /// Unhealthy connections are closed instead of reused, and connections
    /// above the steady-state capacity are retired once enough are idle.
    pub async fn release(&self, conn: PoolConnection<Db>, healthy: bool) {
        if !healthy {
            debug!("Discarding unhealthy connection");
            discard(conn).await;
            return;
        }

        let capacity = self.settings.pool_size;
        if self.pool.size() > capacity && self.pool.num_idle() >= capacity as usize {
            debug!(size = self.pool.size(), capacity, "Retiring overflow connection");
            discard(conn).await;
            return;
        }

        drop(conn);
    }

    /// Start a unit of work on a freshly checked-out connection
    pub async fn unit_of_work(&self) -> DbResult<UnitOfWork> {
        let conn = self.acquire().await?;
        Ok(UnitOfWork::new(self.clone(), conn))
    }

    /// Run `f` in its own unit of work
    ///
    /// Commits when `f` succeeds and the unit is still unresolved; rolls back
    /// when it fails. Errors from `f` other than [`DbError`] are wrapped once
    /// as "Database session failed".
    ///
    /// # Example
    /// ```no_run
    /// use ks_infra::database::ConnectionPool;
    /// use ks_core::errors::DbError;
    ///
    /// async fn touch(pool: &ConnectionPool) -> Result<u64, DbError> {
    ///     pool.with_unit_of_work(|uow| {
    ///         Box::pin(async move {
    ///             let done = uow.execute(sqlx::query("UPDATE jobs SET seen = 1")).await?;
    ///             Ok::<_, DbError>(done.rows_affected())
    ///         })
    ///     })
    ///     .await
    /// }
    /// ```
    pub async fn with_unit_of_work<F, R, E>(&self, f: F) -> DbResult<R>
    where
        F: for<'c> FnOnce(&'c mut UnitOfWork) -> BoxFuture<'c, Result<R, E>>,
        E: Into<BoxError>,
    {
        let mut uow = self.unit_of_work().await?;
        match f(&mut uow).await {
            Ok(value) => {
                if uow.is_active() {
                    uow.commit().await?;
                }
                Ok(value)
            }
            Err(err) => {
                let err = absorb(err.into(), "Database session failed");
                if uow.is_active() {
                    if let Err(rollback_err) = uow.rollback().await {
                        warn!(error = %rollback_err, "Rollback after failed session also failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Close every connection; later acquires fail with `InvalidState`
    ///
    /// Calling this more than once is a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Database connection pool already disposed");
            return;
        }
        info!("Closing database connection pool");
        self.pool.close().await;
        info!("Database connection pool closed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst) || self.pool.is_closed()
    }

    pub fn statistics(&self) -> PoolStatistics {
        let connections = self.pool.size();
        let idle_connections = self.pool.num_idle();
        PoolStatistics {
            connections,
            idle_connections,
            checked_out: connections.saturating_sub(idle_connections as u32),
            capacity: self.settings.pool_size,
            max_overflow: self.settings.max_overflow,
            max_connections: self.settings.max_connections(),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("url", &self.settings.masked_url())
            .field("statistics", &self.statistics())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatistics {
    /// Open connections, idle or checked out
    pub connections: u32,
    pub idle_connections: usize,
    pub checked_out: u32,
    /// Steady-state size
    pub capacity: u32,
    /// Extra connections allowed under burst
    pub max_overflow: u32,
    /// `capacity + max_overflow`
    pub max_connections: u32,
}

impl PoolStatistics {
    /// Connections open beyond the steady-state capacity
    pub fn overflow(&self) -> u32 {
        self.connections.saturating_sub(self.capacity)
    }
}

impl std::fmt::Display for PoolStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} connections ({} idle, {} checked out)",
            self.connections, self.max_connections, self.idle_connections, self.checked_out
        )
    }
}

fn connect_options(settings: &DatabaseConfig) -> DbResult<DbConnectOptions> {
    settings.validate().map_err(|reason| {
        DbError::database(
            format!("Invalid database settings: {}", reason),
            ErrorCode::ConfigurationError,
        )
    })?;

    let echo = if settings.echo {
        LevelFilter::Info
    } else {
        LevelFilter::Debug
    };
    let options = DbConnectOptions::from_str(&settings.url)
        .map_err(|e| {
            DbError::wrap(
                format!("Invalid database URL: {}", settings.masked_url()),
                ErrorCode::ConfigurationError,
                e,
            )
        })?
        .log_statements(echo)
        .log_slow_statements(LevelFilter::Warn, settings.slow_query_threshold());
    Ok(options)
}

fn pool_options(settings: &DatabaseConfig) -> PoolOptions<Db> {
    let statements = Arc::new(backend::session_statements(
        &settings.server_settings,
        settings.statement_timeout(),
    ));

    PoolOptions::<Db>::new()
        .max_connections(settings.max_connections())
        .min_connections(0)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(non_zero(settings.idle_timeout()))
        .max_lifetime(non_zero(settings.recycle_age()))
        .test_before_acquire(settings.pool_pre_ping)
        .after_connect(move |conn, _meta| {
            let statements = Arc::clone(&statements);
            Box::pin(async move {
                for statement in statements.iter() {
                    (&mut *conn).execute(statement.as_str()).await?;
                }
                Ok(())
            })
        })
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

async fn discard(conn: PoolConnection<Db>) {
    if let Err(e) = conn.detach().close().await {
        debug!(error = %e, "Error while closing discarded connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creation_with_invalid_url() {
        let settings = DatabaseConfig::new("sqlite://keystone.db?mode=bogus");
        let result = ConnectionPool::new(settings);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pool_rejects_zero_capacity() {
        let settings = DatabaseConfig::new("sqlite::memory:").with_pool_size(0);
        let err = ConnectionPool::new(settings).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[tokio::test]
    async fn test_lazy_pool_opens_nothing() {
        let settings = DatabaseConfig::new("sqlite::memory:")
            .with_pool_size(3)
            .with_max_overflow(2);
        let pool = ConnectionPool::new(settings).unwrap();

        let stats = pool.statistics();
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.max_connections, 5);
    }

    #[test]
    fn test_pool_statistics_display() {
        let stats = PoolStatistics {
            connections: 5,
            idle_connections: 3,
            checked_out: 2,
            capacity: 10,
            max_overflow: 5,
            max_connections: 15,
        };

        let display = format!("{}", stats);
        assert!(display.contains("5/15"));
        assert!(display.contains("3 idle"));
        assert!(display.contains("2 checked out"));
    }

    #[test]
    fn test_zero_durations_disable_limits() {
        assert_eq!(non_zero(Duration::ZERO), None);
        assert_eq!(
            non_zero(Duration::from_secs(5)),
            Some(Duration::from_secs(5))
        );
    }
}
