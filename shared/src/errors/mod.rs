//! Shared error classification and the client-facing error envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// High-level error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    Validation,
    Database,
    Authentication,
    Authorization,
    BusinessRule,
    ExternalService,
    Internal,
}

impl ErrorCategory {
    /// Caused by the client (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorCategory::NotFound
                | ErrorCategory::Validation
                | ErrorCategory::Authentication
                | ErrorCategory::Authorization
                | ErrorCategory::BusinessRule
        )
    }

    /// Server-side failure (5xx)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// HTTP status an API layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::NotFound => 404,
            ErrorCategory::Validation => 422,
            ErrorCategory::Authentication => 401,
            ErrorCategory::Authorization => 403,
            ErrorCategory::BusinessRule => 400,
            ErrorCategory::ExternalService => 502,
            ErrorCategory::Database | ErrorCategory::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Database => "database",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::BusinessRule => "business_rule",
            ErrorCategory::ExternalService => "external_service",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specific error codes for detailed error identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Not found
    ResourceNotFound,
    EntityNotFound,

    // Validation
    InvalidInput,
    MissingField,
    InvalidFormat,
    ConstraintViolation,
    DuplicateEntry,

    // Database
    DatabaseConnectionError,
    DatabaseQueryError,
    DatabaseIntegrityError,
    DatabaseTimeout,

    // Authentication
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,
    AuthenticationRequired,

    // Authorization
    InsufficientPermissions,
    AccessDenied,
    ResourceForbidden,

    // Business rules
    BusinessRuleViolation,
    InvalidState,
    OperationNotAllowed,

    // External services
    ExternalServiceError,
    ExternalServiceTimeout,
    ExternalServiceUnavailable,

    // Internal
    InternalError,
    ConfigurationError,
    UnknownError,
}

impl ErrorCode {
    /// Category this code belongs to
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            ResourceNotFound | EntityNotFound => ErrorCategory::NotFound,
            InvalidInput | MissingField | InvalidFormat | ConstraintViolation | DuplicateEntry => {
                ErrorCategory::Validation
            }
            DatabaseConnectionError | DatabaseQueryError | DatabaseIntegrityError
            | DatabaseTimeout => ErrorCategory::Database,
            InvalidCredentials | TokenExpired | TokenInvalid | AuthenticationRequired => {
                ErrorCategory::Authentication
            }
            InsufficientPermissions | AccessDenied | ResourceForbidden => {
                ErrorCategory::Authorization
            }
            BusinessRuleViolation | InvalidState | OperationNotAllowed => {
                ErrorCategory::BusinessRule
            }
            ExternalServiceError | ExternalServiceTimeout | ExternalServiceUnavailable => {
                ErrorCategory::ExternalService
            }
            InternalError | ConfigurationError | UnknownError => ErrorCategory::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            ResourceNotFound => "resource_not_found",
            EntityNotFound => "entity_not_found",
            InvalidInput => "invalid_input",
            MissingField => "missing_field",
            InvalidFormat => "invalid_format",
            ConstraintViolation => "constraint_violation",
            DuplicateEntry => "duplicate_entry",
            DatabaseConnectionError => "database_connection_error",
            DatabaseQueryError => "database_query_error",
            DatabaseIntegrityError => "database_integrity_error",
            DatabaseTimeout => "database_timeout",
            InvalidCredentials => "invalid_credentials",
            TokenExpired => "token_expired",
            TokenInvalid => "token_invalid",
            AuthenticationRequired => "authentication_required",
            InsufficientPermissions => "insufficient_permissions",
            AccessDenied => "access_denied",
            ResourceForbidden => "resource_forbidden",
            BusinessRuleViolation => "business_rule_violation",
            InvalidState => "invalid_state",
            OperationNotAllowed => "operation_not_allowed",
            ExternalServiceError => "external_service_error",
            ExternalServiceTimeout => "external_service_timeout",
            ExternalServiceUnavailable => "external_service_unavailable",
            InternalError => "internal_error",
            ConfigurationError => "configuration_error",
            UnknownError => "unknown_error",
        }
    }

    /// HTTP status an API layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseTimeout
            | ErrorCode::ExternalServiceUnavailable => 503,
            ErrorCode::ExternalServiceTimeout => 504,
            other => other.category().status_code(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard error response structure returned to API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for client identification
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error details (field errors, lookup keys, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,

    /// Timestamp when the error occurred
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an error response from a classified code
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.as_str(), message)
    }

    /// Create an error response with details
    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
            timestamp: Utc::now(),
        }
    }

    /// Add a detail field to the error response
    pub fn add_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let details = self.details.get_or_insert_with(HashMap::new);
        if let Ok(json_value) = serde_json::to_value(value) {
            details.insert(key.into(), json_value);
        }
        self
    }
}

/// Trait for converting errors to ErrorResponse
pub trait IntoErrorResponse {
    fn to_error_response(&self) -> ErrorResponse;

    /// HTTP status matching the response
    fn status_code(&self) -> u16 {
        500
    }
}

/// Result type with ErrorResponse as error
pub type ApiResult<T> = Result<T, ErrorResponse>;
