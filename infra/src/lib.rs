//! # Infrastructure Layer
//!
//! SQL implementation of the Keystone database layer on top of SQLx:
//! connection pooling, units of work with nested transaction scopes, the
//! generic SQL repository and a liveness probe.
//!
//! ## Features
//!
//! - `sqlite`: SQLite backend (default)
//! - `mysql`: MySQL backend, used when `sqlite` is disabled

pub mod database;

use ks_core::errors::DbError;
use ks_shared::config::{AppConfig, ConfigError};
use ks_shared::logging::{init_logging, LoggingError};

pub use database::{
    ConnectionPool, HealthProbe, HealthReport, SqlRepository, TransactionScope, UnitOfWork,
};

/// Handles created at startup
#[derive(Debug, Clone)]
pub struct Infrastructure {
    pub config: AppConfig,
    pub pool: ConnectionPool,
}

impl Infrastructure {
    pub fn health_probe(&self) -> HealthProbe {
        HealthProbe::new(self.pool.clone())
    }

    /// Close the pool; call once during application shutdown
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down infrastructure services");
        self.pool.dispose().await;
    }
}

/// Initialize infrastructure services
///
/// This function:
/// - Loads layered configuration for the current environment
/// - Installs the global tracing subscriber
/// - Opens the database connection pool
pub async fn initialize() -> Result<Infrastructure, InfrastructureError> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    tracing::info!(
        environment = %config.environment,
        app = %config.server.app_name,
        "Initializing infrastructure services..."
    );

    let pool = ConnectionPool::connect(config.database.clone()).await?;

    tracing::info!("Infrastructure services initialized successfully");
    Ok(Infrastructure { config, pool })
}

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}
