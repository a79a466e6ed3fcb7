//! Offset pagination shared by ledger queries.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size bounds applied to incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_PAGE_SIZE,
            max_size: MAX_PAGE_SIZE,
        }
    }
}

/// Requested page (0-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    /// `None` or `0` means the default size.
    pub size: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: Some(size),
        }
    }

    /// Returns a request whose size is resolved against `limits`.
    pub fn normalized(self, limits: PageLimits) -> Self {
        Self {
            page: self.page,
            size: Some(normalize_page_size(self.size, limits)),
        }
    }

    pub fn limit(&self, limits: PageLimits) -> u32 {
        normalize_page_size(self.size, limits)
    }

    pub fn offset(&self, limits: PageLimits) -> u64 {
        u64::from(self.page) * u64::from(self.limit(limits))
    }
}

/// Normalizes a page size: defaults when unset or zero, clamps to the max.
pub fn normalize_page_size(size: Option<u32>, limits: PageLimits) -> u32 {
    match size {
        None | Some(0) => limits.default_size,
        Some(value) if value > limits.max_size => limits.max_size,
        Some(value) => value,
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    /// Applied page size.
    pub size: u32,
    /// Matching rows across all pages.
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_items.div_ceil(u64::from(self.size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) + 1 < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_page_size, Page, PageLimits, PageRequest};

    #[test]
    fn page_size_defaults_and_clamps() {
        let limits = PageLimits::default();
        assert_eq!(normalize_page_size(None, limits), 20);
        assert_eq!(normalize_page_size(Some(0), limits), 20);
        assert_eq!(normalize_page_size(Some(500), limits), 100);
        assert_eq!(normalize_page_size(Some(7), limits), 7);
    }

    #[test]
    fn offset_uses_normalized_size() {
        let request = PageRequest::new(3, 0);
        assert_eq!(request.offset(PageLimits::default()), 60);
    }

    #[test]
    fn page_metadata() {
        let page = Page {
            items: vec![1, 2],
            page: 0,
            size: 2,
            total_items: 5,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());

        let last = Page {
            items: vec![5],
            page: 2,
            size: 2,
            total_items: 5,
        };
        assert!(!last.has_next());
    }
}
