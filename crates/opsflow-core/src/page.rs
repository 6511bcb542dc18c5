//! Offset/limit pagination

use crate::cancel::{self, CancelSignal};
use crate::classify::ApiError;
use crate::error::{OpsError, Result};
use crate::retry::RetryingExecutor;
use std::future::Future;
use std::time::Duration;

/// One response of a describe call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Total number of matching items, when the remote reports it
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, total: None }
    }

    pub fn with_total(items: Vec<T>, total: u64) -> Self {
        Self {
            items,
            total: Some(total),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> From<Vec<T>> for Page<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// Walks an offset/limit API until it runs out of items
///
/// Collection stops on an empty page, on a page shorter than the page size,
/// or once a reported total has been reached. Any error aborts the whole
/// collection; partial results are never returned.
#[derive(Debug, Clone)]
pub struct PageCollector {
    page_size: u64,
    cancel: Option<CancelSignal>,
}

impl PageCollector {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Collect every item. `describe(offset, limit)` fetches one page and is
    /// expected to do its own retrying.
    pub async fn collect_all<T, F, Fut>(&self, mut describe: F) -> Result<Vec<T>>
    where
        F: FnMut(u64, u64) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        if self.page_size == 0 {
            return Err(OpsError::InvalidConfig("page size must be positive".to_string()));
        }

        let cancel = self.cancel.as_ref();
        let mut items = Vec::new();
        let mut offset = 0;

        loop {
            let page = cancel::race(describe(offset, self.page_size), cancel)
                .await
                .ok_or_else(|| OpsError::cancelled("pagination"))??;

            let fetched = page.items.len() as u64;
            tracing::debug!(
                "Fetched page at offset {}: {} items (limit {})",
                offset,
                fetched,
                self.page_size
            );

            if fetched == 0 {
                break;
            }
            items.extend(page.items);

            if fetched < self.page_size {
                break;
            }
            if page.total.is_some_and(|total| items.len() as u64 >= total) {
                break;
            }
            offset += self.page_size;
        }

        Ok(items)
    }

    /// [`collect_all`](Self::collect_all) with every page fetch run through
    /// `executor`
    pub async fn collect_all_retrying<T, F, Fut>(
        &self,
        executor: &RetryingExecutor,
        operation: &str,
        deadline: Duration,
        describe: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(u64, u64) -> Fut,
        Fut: Future<Output = std::result::Result<Page<T>, ApiError>>,
    {
        let describe = &describe;
        self.collect_all(move |offset, limit| {
            executor.execute(operation, deadline, move || describe(offset, limit))
        })
        .await
    }
}
