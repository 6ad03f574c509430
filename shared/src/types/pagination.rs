//! Pagination related types for list endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page-based pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Current page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,

    /// Number of items per page
    #[serde(default = "default_size")]
    pub size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_size(),
        }
    }
}

impl Pagination {
    /// Create a new pagination, clamping out-of-range values
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE),
        }
    }

    /// Number of rows to skip for this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }

    /// Number of rows to take for this page
    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }

    /// Check if this is the first page
    pub fn is_first_page(&self) -> bool {
        self.page == 1
    }
}

/// Metadata describing one page of a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Current page number (1-indexed)
    pub page: u32,

    /// Items per page
    pub size: u32,

    /// Total number of items across all pages
    pub total: u64,

    /// Total number of pages
    pub pages: u32,
}

impl PageInfo {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        Self {
            page: pagination.page,
            size: pagination.size,
            total,
            pages: total_pages(total, pagination.size),
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Paginated response wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// Always true for paginated results
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Items of the current page
    pub items: Vec<T>,

    pub page_info: PageInfo,

    pub timestamp: DateTime<Utc>,
}

impl<T> PaginatedResponse<T> {
    /// Create a new paginated response
    pub fn new(items: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self {
            success: true,
            message: None,
            items,
            page_info: PageInfo::new(pagination, total),
            timestamp: Utc::now(),
        }
    }

    /// Create an empty paginated response
    pub fn empty(pagination: Pagination) -> Self {
        Self::new(Vec::new(), pagination, 0)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Transform the items using a function
    pub fn map<U, F>(self, f: F) -> PaginatedResponse<U>
    where
        F: FnMut(T) -> U,
    {
        PaginatedResponse {
            success: self.success,
            message: self.message,
            items: self.items.into_iter().map(f).collect(),
            page_info: self.page_info,
            timestamp: self.timestamp,
        }
    }

    /// Check if the page is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cursor-based pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorInfo {
    /// Opaque cursor of the current position
    pub cursor: String,

    /// Whether there are more items after this cursor
    pub has_next: bool,

    /// Whether there are items before this cursor
    #[serde(default)]
    pub has_previous: bool,

    /// Number of items in the current result
    pub count: usize,
}

/// Response for cursor-based pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPaginatedResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub items: Vec<T>,

    pub cursor_info: CursorInfo,

    pub timestamp: DateTime<Utc>,
}

impl<T> CursorPaginatedResponse<T> {
    pub fn new(items: Vec<T>, cursor: impl Into<String>, has_next: bool) -> Self {
        let count = items.len();
        Self {
            success: true,
            message: None,
            items,
            cursor_info: CursorInfo {
                cursor: cursor.into(),
                has_next,
                has_previous: false,
                count,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn with_previous(mut self, has_previous: bool) -> Self {
        self.cursor_info.has_previous = has_previous;
        self
    }
}

fn total_pages(total: u64, size: u32) -> u32 {
    if total == 0 || size == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

// Constants
const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PAGE_SIZE: u32 = 20;
const MIN_PAGE_SIZE: u32 = 1;
const MAX_PAGE_SIZE: u32 = 1000;

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
