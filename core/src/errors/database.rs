//! Errors raised by the database access layer

use ks_shared::errors::ErrorCode;
use serde_json::{Map, Value};
use thiserror::Error;

use super::domain_error::{BoxError, DomainError, ErrorContext, ErrorDetails};

/// Database layer failures
///
/// * `PoolExhausted` - no connection became free within the acquire timeout;
///   retry after backoff.
/// * `InvalidState` - protocol misuse such as using a resolved unit of work
///   or closing scopes out of order; a defect, never retried.
/// * `NotFound` - a raising lookup matched no row.
/// * `Database` - any storage-engine failure, carrying the original cause.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("No database connection available within {timeout_ms} ms")]
    PoolExhausted { timeout_ms: u64 },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("{entity} not found: {lookup}")]
    NotFound { entity: &'static str, lookup: Value },

    #[error("{message}")]
    Database {
        message: String,
        code: ErrorCode,
        context: ErrorContext,
        #[source]
        source: Option<BoxError>,
    },
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        DbError::InvalidState {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, lookup: Value) -> Self {
        DbError::NotFound { entity, lookup }
    }

    /// Storage failure without an underlying cause
    pub fn database(message: impl Into<String>, code: ErrorCode) -> Self {
        DbError::Database {
            message: message.into(),
            code,
            context: ErrorContext::new(),
            source: None,
        }
    }

    /// Wrap a foreign error as a storage failure
    pub fn wrap(message: impl Into<String>, code: ErrorCode, source: impl Into<BoxError>) -> Self {
        DbError::Database {
            message: message.into(),
            code,
            context: ErrorContext::new(),
            source: Some(source.into()),
        }
    }

    /// Add a context entry; only `Database` errors carry free-form context
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let DbError::Database { context, .. } = &mut self {
            context.insert(key.into(), value.into());
        }
        self
    }

    /// Error code matching this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::PoolExhausted { .. } => ErrorCode::DatabaseTimeout,
            DbError::InvalidState { .. } => ErrorCode::InvalidState,
            DbError::NotFound { .. } => ErrorCode::EntityNotFound,
            DbError::Database { code, .. } => *code,
        }
    }

    /// Whether the caller may retry after backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::PoolExhausted { .. } => true,
            DbError::Database { code, .. } => matches!(
                code,
                ErrorCode::DatabaseConnectionError | ErrorCode::DatabaseTimeout
            ),
            DbError::InvalidState { .. } | DbError::NotFound { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, DbError::InvalidState { .. })
    }
}

impl From<DbError> for DomainError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::PoolExhausted { timeout_ms } => DomainError::Database(ErrorDetails {
                message: format!("No database connection available within {} ms", timeout_ms),
                code: ErrorCode::DatabaseTimeout,
                context: context_of([("timeout_ms", Value::from(timeout_ms))]),
                source: None,
            }),
            DbError::InvalidState { message } => DomainError::Internal(ErrorDetails {
                message: format!("Invalid database usage: {}", message),
                code: ErrorCode::InternalError,
                context: ErrorContext::new(),
                source: None,
            }),
            DbError::NotFound { entity, lookup } => DomainError::NotFound(ErrorDetails {
                message: format!("{} not found", entity),
                code: ErrorCode::EntityNotFound,
                context: context_of([("entity", Value::from(entity)), ("lookup", lookup)]),
                source: None,
            }),
            DbError::Database {
                message,
                code,
                context,
                source,
            } => DomainError::Database(ErrorDetails {
                message,
                code,
                context,
                source,
            }),
        }
    }
}

fn context_of<const N: usize>(entries: [(&str, Value); N]) -> ErrorContext {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect::<Map<String, Value>>()
}
