//! Page-number pagination shared by every post listing.
//!
//! Requests never fail: a missing or malformed `page` parameter selects the
//! first page and out-of-range numbers are clamped to the nearest valid page.

use std::num::NonZeroU32;

use serde::Serialize;

/// Query string parameter carrying the requested page number.
pub const PAGE_QUERY_PARAM: &str = "page";

/// Slice of an ordered collection to fetch from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u64,
}

/// Resolved position of a page within a collection of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
    pub per_page: u32,
}

impl PageWindow {
    pub fn request(&self) -> PageRequest {
        PageRequest {
            limit: self.per_page,
            offset: (self.number - 1) * u64::from(self.per_page),
        }
    }

    /// Number of items that belong on this page.
    pub fn len(&self) -> u64 {
        let consumed = (self.number - 1) * u64::from(self.per_page);
        self.total
            .saturating_sub(consumed)
            .min(u64::from(self.per_page))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: NonZeroU32,
}

impl Paginator {
    pub fn new(per_page: NonZeroU32) -> Self {
        Self { per_page }
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.get()
    }

    /// At least one page exists even when the collection is empty.
    pub fn num_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.per_page.get())).max(1)
    }

    pub fn window(&self, requested: i64, total: u64) -> PageWindow {
        let num_pages = self.num_pages(total);
        let number = if requested < 1 {
            1
        } else {
            (requested as u64).min(num_pages)
        };

        PageWindow {
            number,
            num_pages,
            total,
            per_page: self.per_page.get(),
        }
    }
}

/// Interpret the raw `page` query value; anything unparsable means page 1.
pub fn parse_page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(1)
}

/// A rendered page of items with navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(window: PageWindow, items: Vec<T>) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total: window.total,
            per_page: window.per_page,
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.has_next() || self.has_previous()
    }

    pub fn next_page_number(&self) -> Option<u64> {
        self.has_next().then_some(self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<u64> {
        self.has_previous().then_some(self.number - 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
            per_page: self.per_page,
        }
    }
}
