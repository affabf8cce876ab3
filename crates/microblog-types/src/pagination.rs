use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A 1-based page of a feed. Pages below 1 are clamped to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    per_page: u64,
}

impl PageRequest {
    pub fn new(page: i64, per_page: u64) -> Self {
        Self {
            page: page.max(1) as u64,
            per_page: per_page.max(1),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// One page of results plus the numbers needed to render prev/next links.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, items: Vec<T>, total: u64) -> Self {
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            has_next: request.page.saturating_mul(request.per_page) < total,
            has_prev: request.page > 1,
        }
    }

    pub fn next_page(&self) -> Option<u64> {
        self.has_next.then(|| self.page + 1)
    }

    pub fn prev_page(&self) -> Option<u64> {
        self.has_prev.then(|| self.page - 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}
