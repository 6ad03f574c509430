//! Mapping from driver errors to [`DbError`]

use ks_core::errors::{BoxError, DbError, ErrorCode};
use sqlx::error::ErrorKind;

/// MySQL: query execution was interrupted by `max_execution_time`
const MYSQL_EXECUTION_TIMEOUT: &str = "3024";
/// SQLite: SQLITE_BUSY, the busy timeout elapsed
const SQLITE_BUSY: &str = "5";

/// Classify a driver error, keeping it as the source
pub fn classify(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => DbError::PoolExhausted { timeout_ms: 0 },
        sqlx::Error::PoolClosed => DbError::invalid_state("connection pool has been closed"),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => {
            DbError::wrap("Database connection failed", ErrorCode::DatabaseConnectionError, err)
        }
        sqlx::Error::Configuration(_) => {
            DbError::wrap("Invalid database configuration", ErrorCode::ConfigurationError, err)
        }
        sqlx::Error::Database(ref db) => {
            let message = db.message().to_string();
            let code = match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => ErrorCode::DatabaseIntegrityError,
                _ => match db.code().as_deref() {
                    Some(MYSQL_EXECUTION_TIMEOUT) | Some(SQLITE_BUSY) => ErrorCode::DatabaseTimeout,
                    _ => ErrorCode::DatabaseQueryError,
                },
            };
            let prefix = match code {
                ErrorCode::DatabaseIntegrityError => "Database integrity violation",
                ErrorCode::DatabaseTimeout => "Database statement timed out",
                _ => "Database query failed",
            };
            DbError::wrap(format!("{}: {}", prefix, message), code, err)
        }
        other => DbError::wrap("Database query failed", ErrorCode::DatabaseQueryError, other),
    }
}

/// Turn an error raised inside a unit-of-work callback into a [`DbError`]
///
/// Database-layer errors pass through unchanged and driver errors are
/// classified; anything else is wrapped once under `message`.
pub(crate) fn absorb(err: BoxError, message: &str) -> DbError {
    match err.downcast::<DbError>() {
        Ok(db) => *db,
        Err(other) => match other.downcast::<sqlx::Error>() {
            Ok(driver) => classify(*driver),
            Err(other) => DbError::wrap(message, ErrorCode::DatabaseQueryError, other),
        },
    }
}

/// Whether the connection that produced this error should be discarded
pub(crate) fn breaks_connection(err: &DbError) -> bool {
    matches!(err.code(), ErrorCode::DatabaseConnectionError)
}
