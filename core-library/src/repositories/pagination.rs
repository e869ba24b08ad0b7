//! Pagination for catalog and error-log listings
//!
//! Pages are 0-indexed. Page sizes are clamped to `1..=MAX_PAGE_SIZE` so a
//! caller cannot request an unbounded listing.

use serde::{Deserialize, Serialize};

/// Largest page a listing will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not pick one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Which slice of a listing to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Build a request, clamping `page_size` into range
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// assert_eq!(PageRequest::new(1, 20).offset(), 20);
    /// assert_eq!(PageRequest::new(0, 0).page_size, 1);
    /// assert_eq!(PageRequest::new(0, 5000).page_size, 100);
    /// ```
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip, as bound to SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }

    /// Rows to return, as bound to SQL `LIMIT`
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

/// One page of a listing plus the figures needed to navigate it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let page_size = u64::from(request.page_size.max(1));
        let total_pages = u32::try_from(total.div_ceil(page_size)).unwrap_or(u32::MAX);

        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_add(1) < self.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}
