//! Pagination engine.
//!
//! A list is paged in two steps: count the matching items, then fetch one
//! window of them. Page numbers are never rejected; anything outside
//! `[1, max(1, total_pages)]` is clamped into that range.

use async_trait::async_trait;
use serde::Serialize;
use std::num::NonZeroU32;

/// A countable, sliceable ordered sequence.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;
    type Error: Send;

    /// Total number of items in the sequence.
    async fn count(&self) -> Result<u64, Self::Error>;

    /// Up to `limit` items starting at `offset`.
    async fn slice(&self, offset: u64, limit: u64) -> Result<Vec<Self::Item>, Self::Error>;
}

/// Paging arithmetic for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub page_index: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_items: u64,
}

impl PageWindow {
    pub fn new(total_items: u64, requested: Option<i64>, page_size: NonZeroU32) -> Self {
        let page_size = u64::from(page_size.get());
        let total_pages = total_items.div_ceil(page_size);
        let last = total_pages.max(1);
        let requested = requested.unwrap_or(1);
        let page_index = if requested < 1 {
            1
        } else {
            (requested as u64).min(last)
        };

        Self {
            page_index,
            page_size,
            total_pages,
            total_items,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page_index - 1) * self.page_size
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index < self.total_pages
    }
}

/// One page of items plus paging metadata.
#[derive(Serialize, Clone, Debug)]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    pub page_index: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_items: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl<T> PaginatedList<T> {
    fn from_window(items: Vec<T>, window: PageWindow) -> Self {
        Self {
            items,
            page_index: window.page_index,
            page_size: window.page_size,
            total_pages: window.total_pages,
            total_items: window.total_items,
            has_previous_page: window.has_previous_page(),
            has_next_page: window.has_next_page(),
        }
    }

    /// Count `source`, clamp the requested page and fetch exactly that page.
    pub async fn create<S>(
        source: &S,
        requested: Option<i64>,
        page_size: NonZeroU32,
    ) -> Result<Self, S::Error>
    where
        S: PageSource<Item = T> + ?Sized,
    {
        let total = source.count().await?;
        let window = PageWindow::new(total, requested, page_size);
        let items = if total == 0 {
            Vec::new()
        } else {
            source.slice(window.offset(), window.page_size).await?
        };
        Ok(Self::from_window(items, window))
    }
}
