//! Type definitions module
//!
//! - `common` - Sorting and timestamp types
//! - `pagination` - Page and cursor based pagination envelopes
//! - `response` - API response wrappers and health checks

pub mod common;
pub mod pagination;
pub mod response;

pub use common::{SortOrder, Timestamp};
pub use pagination::{CursorInfo, CursorPaginatedResponse, PageInfo, PaginatedResponse, Pagination};
pub use response::{ApiResponse, HealthResponse, HealthStatus, MessageResponse, ServiceHealth};
