//! Schema migrations from a directory of SQL files

use std::path::Path;

use ks_core::errors::{DbError, DbResult, ErrorCode};
use sqlx::migrate::Migrator;

use super::pool::ConnectionPool;

/// Apply every pending migration found in `dir`
///
/// Files follow the SQLx naming scheme (`<version>_<description>.sql`) and
/// are applied in version order; already-applied versions are skipped.
pub async fn run_migrations(pool: &ConnectionPool, dir: impl AsRef<Path>) -> DbResult<()> {
    let dir = dir.as_ref();
    tracing::info!(directory = %dir.display(), "Running database migrations");

    let migrator = Migrator::new(dir).await.map_err(|e| {
        DbError::wrap(
            format!("Failed to load migrations from {}", dir.display()),
            ErrorCode::ConfigurationError,
            e,
        )
    })?;

    migrator.run(pool.inner()).await.map_err(|e| {
        tracing::error!("Database migration failed: {}", e);
        DbError::wrap("Database migration failed", ErrorCode::DatabaseQueryError, e)
    })?;

    tracing::info!("Database migrations completed");
    Ok(())
}
