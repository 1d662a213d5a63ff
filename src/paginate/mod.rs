//! Pagination driver
//!
//! Calls a page fetcher repeatedly, starting at offset 0 with no cursor,
//! and accumulates the items. The loop stops on the first of:
//!
//! - an empty page
//! - a page whose `has_more` is `Some(false)`
//! - `max_pages` pages fetched, even when every page claims more
//! - a failed page
//!
//! A failure on the first page is returned as the error. A failure on a
//! later page keeps the items gathered so far and is reported through
//! [`StopReason::Failed`], so the caller decides whether partial data is
//! acceptable (it is not when the failure was a cancellation).

use std::fmt;
use std::future::Future;

/// Position of the page being requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page number
    pub index: u32,
    /// Items returned by all previous pages
    pub offset: u32,
    /// Cursor from the previous page, if the upstream sent one
    pub cursor: Option<String>,
}

/// One fetched and parsed page
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the upstream gives no signal
    pub has_more: Option<bool>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: None,
            next_cursor: None,
        }
    }

    pub fn with_has_more(mut self, has_more: Option<bool>) -> Self {
        self.has_more = has_more;
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.next_cursor = cursor;
        self
    }
}

#[derive(Debug)]
pub enum StopReason<E> {
    EmptyPage,
    NoMorePages,
    MaxPages,
    Failed(E),
}

impl<E> StopReason<E> {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl<E: fmt::Display> fmt::Display for StopReason<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPage => write!(f, "empty page"),
            Self::NoMorePages => write!(f, "no more pages"),
            Self::MaxPages => write!(f, "page limit reached"),
            Self::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Everything a pagination run produced
#[derive(Debug)]
pub struct Pagination<T, E> {
    pub items: Vec<T>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason<E>,
}

/// Runs `fetch_page` until the upstream runs dry or `max_pages` is reached
///
/// `max_pages` of 0 is treated as 1: at least one page is always attempted.
pub async fn paginate<T, E, F, Fut>(max_pages: u32, mut fetch_page: F) -> Result<Pagination<T, E>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    E: fmt::Display,
{
    let max_pages = max_pages.max(1);
    let mut items = Vec::new();
    let mut request = PageRequest {
        index: 0,
        offset: 0,
        cursor: None,
    };

    let stop_reason = loop {
        if request.index >= max_pages {
            tracing::debug!(max_pages, items = items.len(), "pagination stopped at page limit");
            break StopReason::MaxPages;
        }

        let page = match fetch_page(request.clone()).await {
            Ok(page) => page,
            Err(e) if request.index == 0 => return Err(e),
            Err(e) => {
                tracing::warn!(
                    page = request.index,
                    offset = request.offset,
                    error = %e,
                    "page failed; stopping pagination"
                );
                break StopReason::Failed(e);
            }
        };

        let returned = page.items.len();
        if returned == 0 {
            break StopReason::EmptyPage;
        }

        items.extend(page.items);
        request = PageRequest {
            index: request.index + 1,
            offset: request.offset.saturating_add(u32::try_from(returned).unwrap_or(u32::MAX)),
            cursor: page.next_cursor,
        };

        if page.has_more == Some(false) {
            break StopReason::NoMorePages;
        }
    };

    Ok(Pagination {
        items,
        pages_fetched: request.index,
        stop_reason,
    })
}
