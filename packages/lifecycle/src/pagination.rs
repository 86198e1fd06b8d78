// ABOUTME: Page arithmetic for the administrative live-container listing
// ABOUTME: Fixed page size, 1-indexed pages, metadata serialized for the HTTP layer

use serde::{Deserialize, Serialize};

/// Containers shown per admin page
pub const PAGE_SIZE: i64 = 50;

/// Minimum page number (1-indexed)
pub const MIN_PAGE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    MIN_PAGE
}

impl PageRequest {
    pub fn new(page: i64) -> Self {
        Self { page }
    }

    pub fn page(&self) -> i64 {
        self.page.max(MIN_PAGE)
    }

    /// (limit, offset) for SQL
    pub fn limit_offset(&self) -> (i64, i64) {
        (PAGE_SIZE, (self.page() - 1).saturating_mul(PAGE_SIZE))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(MIN_PAGE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub page: i64,

    #[serde(rename = "pageSize")]
    pub page_size: i64,

    #[serde(rename = "totalItems")]
    pub total_items: i64,

    #[serde(rename = "totalPages")]
    pub total_pages: i64,

    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,

    #[serde(rename = "hasPreviousPage")]
    pub has_previous_page: bool,
}

impl PaginationMeta {
    pub fn new(request: &PageRequest, total_items: i64) -> Self {
        let page = request.page();
        let total_pages = (total_items + PAGE_SIZE - 1) / PAGE_SIZE;

        Self {
            page,
            page_size: PAGE_SIZE,
            total_items,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > MIN_PAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset() {
        assert_eq!(PageRequest::new(1).limit_offset(), (50, 0));
        assert_eq!(PageRequest::new(3).limit_offset(), (50, 100));
        // Pages below 1 are clamped
        assert_eq!(PageRequest::new(-4).limit_offset(), (50, 0));
        // Far-out pages saturate instead of overflowing
        assert_eq!(PageRequest::new(i64::MAX).limit_offset(), (50, i64::MAX));
    }

    #[test]
    fn test_meta() {
        let meta = PaginationMeta::new(&PageRequest::new(2), 101);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next_page);
        assert!(meta.has_previous_page);

        let empty = PaginationMeta::new(&PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next_page);
        assert!(!empty.has_previous_page);
    }
}
