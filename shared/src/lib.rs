//! Shared building blocks for Keystone services
//!
//! This crate provides functionality used across all workspace crates:
//! - Configuration types and the layered configuration loader
//! - Error categories, codes and the client-facing error envelope
//! - Success, paginated and health response envelopes
//! - Logging bootstrap and log redaction helpers

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, ConfigError, DatabaseConfig, Environment, LogFormat, LoggingConfig, ServerConfig,
};
pub use errors::{ApiResult, ErrorCategory, ErrorCode, ErrorResponse, IntoErrorResponse};
pub use logging::{init_logging, redact, request_span};
pub use types::{
    ApiResponse, CursorInfo, CursorPaginatedResponse, HealthResponse, HealthStatus,
    MessageResponse, PageInfo, PaginatedResponse, Pagination, ServiceHealth, SortOrder,
};
