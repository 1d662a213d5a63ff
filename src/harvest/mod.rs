//! Harvest context and per-target operations
//!
//! [`Harvester`] is the one place that owns the shared pieces of a run:
//! configuration, the fetcher, the proxy pool, the query builder, the
//! artifact store and the resume index. It is built once by the top-level
//! invocation and handed to every job behind an `Arc`; nothing here is a
//! process-wide singleton.

mod jobs;

pub use jobs::{CityBatch, CityJob, RoomJob};

use crate::config::{ClientConfig, Config};
use crate::fetch::{Component, FetchResponse, Fetcher, RequestSpec};
use crate::output::OutputStore;
use crate::paginate::{paginate, Page, PageRequest, StopReason};
use crate::parse::{
    parse_calendar, parse_details, parse_reviews_page, parse_search_page, Calendar,
    ListingDetails, ListingSummary, Review,
};
use crate::proxy::ProxyPool;
use crate::query::{
    decode_search_cursor, encode_search_cursor, BoundingBox, CalendarParams, QueryBuilder,
    ReviewsParams, SearchParams,
};
use crate::session::{bootstrap_or_fallback, Bootstrap, Credentials};
use crate::storage::{
    RunRecord, RunStatus, SqliteStorage, Storage, StorageError, StorageResult, TargetKind, TargetRecord,
};
use crate::{ConfigError, HarvestError, Result};
use chrono::{Datelike, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

/// A per-room dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Details,
    Calendar,
    Reviews,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Details, Dataset::Calendar, Dataset::Reviews];

    /// Index row kind for this dataset
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Details => TargetKind::Details,
            Self::Calendar => TargetKind::Calendar,
            Self::Reviews => TargetKind::Reviews,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().to_db_string())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "details" => Ok(Self::Details),
            "calendar" => Ok(Self::Calendar),
            "reviews" => Ok(Self::Reviews),
            other => Err(format!(
                "unknown dataset '{}' (expected details, calendar or reviews)",
                other
            )),
        }
    }
}

/// A city search target
#[derive(Debug, Clone, PartialEq)]
pub struct CityTarget {
    pub query: String,
    pub bbox: Option<BoundingBox>,
    pub zoom: u32,
}

impl CityTarget {
    /// A free-text search with no map bounds
    pub fn named(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            bbox: None,
            zoom: 1,
        }
    }
}

/// A parsed result plus the HTTP attempts it cost
#[derive(Debug, Clone)]
pub struct Harvested<T> {
    pub value: T,
    pub attempts: u32,
}

struct Index {
    storage: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
}

impl Index {
    /// Runs `op` against the index on the blocking pool, off the async workers
    async fn with_storage<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteStorage, i64) -> StorageResult<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let run_id = self.run_id;
        tokio::task::spawn_blocking(move || {
            let mut storage = storage.lock().map_err(|_| StorageError::Poisoned)?;
            op(&mut storage, run_id)
        })
        .await?
    }
}

/// Explicit context shared by every job of a run
pub struct Harvester {
    config: Arc<Config>,
    fetcher: Fetcher,
    proxies: ProxyPool,
    queries: QueryBuilder,
    output: OutputStore,
    index: Option<Index>,
    fresh: bool,
    cancel: CancellationToken,
}

fn proxy_pool(client: &ClientConfig) -> Result<ProxyPool> {
    if let Some(path) = &client.proxy_file {
        let pool = ProxyPool::load(Path::new(path))?;
        tracing::info!(path = %path, proxies = pool.len(), "loaded proxy list");
        return Ok(pool);
    }
    match &client.proxy {
        Some(proxy) => {
            let url = Url::parse(proxy)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
            Ok(ProxyPool::new(vec![url]))
        }
        None => Ok(ProxyPool::empty()),
    }
}

/// Wraps a later-page failure so the dataset is reported as failed
///
/// `attempts` counts the pages that succeeded; the failed page's own
/// attempts are added on top. A cancellation passes through untouched.
fn incomplete(error: HarvestError, pages: u32, attempts: u32) -> HarvestError {
    if error.is_cancelled() {
        return error;
    }
    tracing::warn!(pages, error = %error, "pagination failed after earlier pages succeeded");
    HarvestError::Incomplete {
        pages,
        attempts: attempts + error.attempts().unwrap_or(0),
        source: Box::new(error),
    }
}

impl Harvester {
    /// Builds the context from a validated configuration
    ///
    /// Without an index, a target counts as done when its artifact exists.
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let fetcher = Fetcher::new(&config.retry);
        let proxies = proxy_pool(&config.client)?;
        let queries = QueryBuilder::from_config(&config.client)?;
        let output = OutputStore::new(&config.output.directory);

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            proxies,
            queries,
            output,
            index: None,
            fresh: false,
            cancel,
        })
    }

    /// Attaches the resume index and opens a new run in it
    pub fn with_index(mut self, mut storage: SqliteStorage, config_hash: &str) -> Result<Self> {
        let run_id = storage.create_run(config_hash)?;
        tracing::info!(run_id, "started run");
        self.index = Some(Index {
            storage: Arc::new(Mutex::new(storage)),
            run_id,
        });
        Ok(self)
    }

    /// When set, completed targets are fetched again instead of skipped
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output(&self) -> &OutputStore {
        &self.output
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn run_id(&self) -> Option<i64> {
        self.index.as_ref().map(|i| i.run_id)
    }

    /// Closes the current run with `status` and returns its final row
    ///
    /// Returns `None` without an index.
    pub async fn finish(&self, status: RunStatus) -> Result<Option<RunRecord>> {
        let Some(index) = &self.index else {
            return Ok(None);
        };
        let run = index
            .with_storage(move |storage, run_id| {
                storage.finish_run(run_id, status)?;
                storage.get_run(run_id)
            })
            .await?;
        tracing::info!(
            run_id = run.id,
            status = run.status.to_db_string(),
            started_at = %run.started_at,
            finished_at = run.finished_at.as_deref().unwrap_or_default(),
            "finished run"
        );
        Ok(Some(run))
    }

    // ===== Resume Index =====

    /// Whether `(kind, key)` finished earlier and can be skipped
    pub async fn is_done(&self, kind: TargetKind, key: &str) -> bool {
        if self.fresh {
            return false;
        }
        let Some(index) = &self.index else {
            return self.output.artifact_path(kind, key).is_file();
        };

        let owned = key.to_string();
        let completed = index
            .with_storage(move |storage, _| storage.is_completed(kind, &owned))
            .await;
        match completed {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(kind = %kind, key, error = %e, "index lookup failed; treating target as pending");
                false
            }
        }
    }

    /// Records the outcome of one target; index failures are logged, not raised
    pub(crate) async fn record(&self, record: TargetRecord) {
        let Some(index) = &self.index else {
            return;
        };
        let (kind, key) = (record.kind, record.key.clone());
        let written = index
            .with_storage(move |storage, run_id| storage.record_target(run_id, &record))
            .await;
        if let Err(e) = written {
            tracing::error!(kind = %kind, key = %key, error = %e, "failed to update index");
        }
    }

    // ===== Requests =====

    fn proxy(&self) -> Option<Url> {
        self.proxies.pick(self.config.client.proxy_strategy)
    }

    async fn fetch_api(&self, component: Component, url: Url, credentials: &Credentials) -> Result<FetchResponse> {
        let spec = credentials
            .apply(RequestSpec::api(component, url), &self.config.client.api_key_header)
            .with_proxy(self.proxy());
        Ok(self.fetcher.execute(&spec, &self.cancel).await?)
    }

    /// Derives credentials from the room's own page
    ///
    /// The page body is kept so the details dataset can reuse it.
    pub async fn bootstrap_room(&self, room_id: u64) -> Result<Bootstrap> {
        let room_url = self.queries.room_url(room_id)?;
        self.bootstrap(&room_url).await
    }

    async fn bootstrap(&self, page_url: &Url) -> Result<Bootstrap> {
        let bootstrap = bootstrap_or_fallback(
            &self.fetcher,
            page_url,
            self.proxy(),
            self.config.client.fallback_api_key.as_deref(),
            &self.cancel,
        )
        .await?;
        Ok(bootstrap)
    }

    // ===== Datasets =====

    /// Listing details, parsed from the bootstrap page when there is one
    pub async fn listing_details(&self, room_id: u64, bootstrap: &Bootstrap) -> Result<Harvested<ListingDetails>> {
        let room_url = self.queries.room_url(room_id)?;

        let (page, attempts) = match &bootstrap.page {
            Some(page) => (page.clone(), 0),
            None => {
                let spec = RequestSpec::document(Component::Details, room_url.clone()).with_proxy(self.proxy());
                let response = self.fetcher.execute(&spec, &self.cancel).await?;
                (response.text(), response.attempts)
            }
        };

        let details = parse_details(&page, room_id, room_url.as_str())?;
        Ok(Harvested {
            value: details,
            attempts,
        })
    }

    /// Availability for the configured number of months, starting this month
    pub async fn calendar(&self, room_id: u64, credentials: &Credentials) -> Result<Harvested<Calendar>> {
        let today = Utc::now().date_naive();
        let params = CalendarParams {
            listing_id: room_id,
            month: today.month(),
            year: today.year(),
            count: self.config.pagination.calendar_months,
        };
        let url = self.queries.calendar(&self.config.endpoints.calendar, &params)?;

        let response = self.fetch_api(Component::Calendar, url, credentials).await?;
        let calendar = parse_calendar(&response.body, room_id)?;
        Ok(Harvested {
            value: calendar,
            attempts: response.attempts,
        })
    }

    /// Every review page up to the page limit
    ///
    /// A page that still fails after its retries fails the whole dataset,
    /// even when earlier pages succeeded, so the room is fetched again on
    /// the next run.
    pub async fn all_reviews(&self, room_id: u64, credentials: &Credentials) -> Result<Harvested<Vec<Review>>> {
        let limit = self.config.pagination.review_page_size;
        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;

        let result = paginate(self.config.pagination.max_pages, |req: PageRequest| async move {
            let params = ReviewsParams {
                listing_id: room_id,
                offset: req.offset,
                limit,
            };
            let url = self.queries.reviews(&self.config.endpoints.reviews, &params)?;
            let response = self.fetch_api(Component::Reviews, url, credentials).await?;
            attempts_ref.fetch_add(response.attempts, Ordering::Relaxed);

            let page = parse_reviews_page(&response.body)?;
            let returned = page.reviews.len();
            let has_more = page.has_more.unwrap_or(u32::try_from(returned).unwrap_or(u32::MAX) >= limit);

            tracing::debug!(room_id, offset = req.offset, returned, total = page.total_count, "reviews page");
            Ok::<_, HarvestError>(
                Page::new(page.reviews)
                    .with_has_more(Some(has_more))
                    .with_cursor(page.next_cursor),
            )
        })
        .await?;

        if let StopReason::Failed(e) = result.stop_reason {
            return Err(incomplete(e, result.pages_fetched, attempts.into_inner()));
        }

        Ok(Harvested {
            value: result.items,
            attempts: attempts.into_inner(),
        })
    }

    /// All search results for a city, de-duplicated by room id
    pub async fn search_city(&self, target: &CityTarget) -> Result<Harvested<Vec<ListingSummary>>> {
        let bootstrap = self.bootstrap(&self.queries.homepage_url()).await?;
        let credentials = &bootstrap.credentials;
        let items_per_page = self.config.pagination.search_page_size;
        let attempts = AtomicU32::new(1);
        let attempts_ref = &attempts;

        let result = paginate(self.config.pagination.max_pages, |req: PageRequest| async move {
            // Synthesize an offset cursor when the upstream sent none.
            let cursor = req
                .cursor
                .or_else(|| (req.index > 0).then(|| encode_search_cursor(req.offset)));
            tracing::debug!(
                city = %target.query,
                page = req.index,
                cursor_offset = cursor.as_deref().and_then(decode_search_cursor),
                "search page"
            );
            let params = SearchParams {
                query: target.query.clone(),
                bbox: target.bbox,
                zoom: target.zoom,
                items_per_page,
                cursor,
            };
            let url = self.queries.search(&self.config.endpoints.search, &params)?;
            let response = self.fetch_api(Component::Search, url, credentials).await?;
            attempts_ref.fetch_add(response.attempts, Ordering::Relaxed);

            let page = parse_search_page(&response.body)?;
            let full = u32::try_from(page.listings.len()).unwrap_or(u32::MAX) >= items_per_page;
            let has_more = page.has_more() || full;
            Ok::<_, HarvestError>(
                Page::new(page.listings)
                    .with_has_more(Some(has_more))
                    .with_cursor(page.next_cursor),
            )
        })
        .await?;

        if let StopReason::Failed(e) = result.stop_reason {
            return Err(incomplete(e, result.pages_fetched, attempts.into_inner()));
        }

        let mut seen = HashSet::new();
        let listings: Vec<_> = result
            .items
            .into_iter()
            .filter(|l| seen.insert(l.room_id))
            .collect();

        tracing::info!(city = %target.query, listings = listings.len(), pages = result.pages_fetched, "search finished");
        Ok(Harvested {
            value: listings,
            attempts: attempts.into_inner(),
        })
    }

    /// Fetches and parses one room dataset
    pub(crate) async fn fetch_dataset(
        &self,
        dataset: Dataset,
        room_id: u64,
        bootstrap: &Bootstrap,
    ) -> Result<Harvested<DatasetValue>> {
        let credentials = &bootstrap.credentials;
        let harvested = match dataset {
            Dataset::Details => {
                let h = self.listing_details(room_id, bootstrap).await?;
                Harvested {
                    value: DatasetValue::Details(h.value),
                    attempts: h.attempts,
                }
            }
            Dataset::Calendar => {
                let h = self.calendar(room_id, credentials).await?;
                Harvested {
                    value: DatasetValue::Calendar(h.value),
                    attempts: h.attempts,
                }
            }
            Dataset::Reviews => {
                let h = self.all_reviews(room_id, credentials).await?;
                Harvested {
                    value: DatasetValue::Reviews(h.value),
                    attempts: h.attempts,
                }
            }
        };
        Ok(harvested)
    }

    // ===== Artifacts =====

    pub(crate) fn write_dataset(&self, room_id: u64, value: &DatasetValue) -> Result<PathBuf> {
        let path = match value {
            DatasetValue::Details(details) => self.output.write_details(details)?,
            DatasetValue::Calendar(calendar) => self.output.write_calendar(calendar)?,
            DatasetValue::Reviews(reviews) => self.output.write_reviews(room_id, reviews)?,
        };
        Ok(path)
    }
}

/// A fetched room dataset, ready to be written
pub(crate) enum DatasetValue {
    Details(ListingDetails),
    Calendar(Calendar),
    Reviews(Vec<Review>),
}
