//! Pagination envelope shared by every list operation.

use crate::config::PagingConfig;
use serde::{Deserialize, Serialize};

/// Raw paging input as received from a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }
}

/// 1-based page request after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Normalizes raw caller input.
    ///
    /// - `page` 0 or absent -> 1.
    /// - `limit` 0 or absent -> `default_limit`; above `max_limit` -> `max_limit`.
    pub fn normalize(query: PageQuery, paging: &PagingConfig) -> Self {
        let page = query.page.filter(|value| *value > 0).unwrap_or(1);
        let limit = match query.limit {
            None | Some(0) => paging.default_limit,
            Some(value) if value > paging.max_limit => paging.max_limit,
            Some(value) => value,
        };
        Self { page, limit }
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }

    /// Slices an already ordered result set into one page.
    pub fn apply<T>(&self, ordered: Vec<T>) -> Page<T> {
        let total = ordered.len() as u64;
        let items = ordered
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect();
        Page {
            total,
            items,
            page: self.page,
            limit: self.limit,
        }
    }
}

/// One page of results plus the total matching count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
        }
    }
}
