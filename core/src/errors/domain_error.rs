//! Application-level error type shared by services and the API layer

use ks_shared::errors::{ErrorCategory, ErrorCode, ErrorResponse, IntoErrorResponse};
use ks_shared::logging::redact;
use serde_json::{Map, Value};
use thiserror::Error;

/// Boxed error used as the cause of wrapped failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured context attached to an error (entity ids, field names, ...)
pub type ErrorContext = Map<String, Value>;

/// Message, code, context and cause carried by every [`DomainError`]
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ErrorDetails {
    pub message: String,
    pub code: ErrorCode,
    pub context: ErrorContext,
    #[source]
    pub source: Option<BoxError>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            code,
            context: ErrorContext::new(),
            source: None,
        }
    }
}

/// Core domain errors, one variant per [`ErrorCategory`]
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    NotFound(ErrorDetails),

    #[error(transparent)]
    Validation(ErrorDetails),

    #[error(transparent)]
    Database(ErrorDetails),

    #[error(transparent)]
    Authentication(ErrorDetails),

    #[error(transparent)]
    Authorization(ErrorDetails),

    #[error(transparent)]
    BusinessRule(ErrorDetails),

    #[error(transparent)]
    ExternalService(ErrorDetails),

    #[error(transparent)]
    Internal(ErrorDetails),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Build an error whose variant follows the category of `code`
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::from_details(ErrorDetails::new(message, code))
    }

    pub fn from_details(details: ErrorDetails) -> Self {
        match details.code.category() {
            ErrorCategory::NotFound => DomainError::NotFound(details),
            ErrorCategory::Validation => DomainError::Validation(details),
            ErrorCategory::Database => DomainError::Database(details),
            ErrorCategory::Authentication => DomainError::Authentication(details),
            ErrorCategory::Authorization => DomainError::Authorization(details),
            ErrorCategory::BusinessRule => DomainError::BusinessRule(details),
            ErrorCategory::ExternalService => DomainError::ExternalService(details),
            ErrorCategory::Internal => DomainError::Internal(details),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::NotFound(_) => ErrorCategory::NotFound,
            DomainError::Validation(_) => ErrorCategory::Validation,
            DomainError::Database(_) => ErrorCategory::Database,
            DomainError::Authentication(_) => ErrorCategory::Authentication,
            DomainError::Authorization(_) => ErrorCategory::Authorization,
            DomainError::BusinessRule(_) => ErrorCategory::BusinessRule,
            DomainError::ExternalService(_) => ErrorCategory::ExternalService,
            DomainError::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn details(&self) -> &ErrorDetails {
        match self {
            DomainError::NotFound(d)
            | DomainError::Validation(d)
            | DomainError::Database(d)
            | DomainError::Authentication(d)
            | DomainError::Authorization(d)
            | DomainError::BusinessRule(d)
            | DomainError::ExternalService(d)
            | DomainError::Internal(d) => d,
        }
    }

    fn details_mut(&mut self) -> &mut ErrorDetails {
        match self {
            DomainError::NotFound(d)
            | DomainError::Validation(d)
            | DomainError::Database(d)
            | DomainError::Authentication(d)
            | DomainError::Authorization(d)
            | DomainError::BusinessRule(d)
            | DomainError::ExternalService(d)
            | DomainError::Internal(d) => d,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.details().code
    }

    pub fn message(&self) -> &str {
        &self.details().message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.details().context
    }

    /// Add a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details_mut().context.insert(key.into(), value.into());
        self
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.details_mut().source = Some(source.into());
        self
    }

    /// Emit the error through `tracing`: WARN for client errors, ERROR otherwise
    pub fn log(&self) {
        let details = self.details();
        let category = self.category();
        let context = redact(&Value::Object(details.context.clone()));
        let cause = details.source.as_ref().map(|source| source.to_string());

        if category.is_client_error() {
            tracing::warn!(
                error_code = %details.code,
                category = %category,
                context = %context,
                cause = cause.as_deref(),
                "{}",
                details.message
            );
        } else {
            tracing::error!(
                error_code = %details.code,
                category = %category,
                context = %context,
                cause = cause.as_deref(),
                "{}",
                details.message
            );
        }
    }

    /// Serializable form used for structured logs and diagnostics
    pub fn to_json(&self) -> Value {
        let details = self.details();
        let mut error = Map::new();
        error.insert("message".into(), Value::String(details.message.clone()));
        error.insert("code".into(), Value::String(details.code.to_string()));
        error.insert("category".into(), Value::String(self.category().to_string()));
        if !details.context.is_empty() {
            error.insert("context".into(), Value::Object(details.context.clone()));
        }
        if let Some(source) = &details.source {
            error.insert("original_error".into(), Value::String(source.to_string()));
        }

        let mut root = Map::new();
        root.insert("error".into(), Value::Object(error));
        Value::Object(root)
    }
}

impl IntoErrorResponse for DomainError {
    fn to_error_response(&self) -> ErrorResponse {
        let details = self.details();
        let mut response = ErrorResponse::from_code(details.code, details.message.clone());
        if let Value::Object(context) = redact(&Value::Object(details.context.clone())) {
            for (key, value) in context {
                response = response.add_detail(key, value);
            }
        }
        response
    }

    fn status_code(&self) -> u16 {
        self.code().status_code()
    }
}
