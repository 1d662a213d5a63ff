//! Per-target jobs and the batch entry points

use crate::harvest::{CityTarget, Dataset, Harvester};
use crate::output::OutputStore;
use crate::scheduler::{BatchReport, Job, JobSuccess, Scheduler};
use crate::storage::{TargetKind, TargetRecord};
use crate::{HarvestError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Fetches the selected datasets of one room
///
/// Datasets already completed are left alone, so a job interrupted halfway
/// only redoes what is missing.
pub struct RoomJob {
    harvester: Arc<Harvester>,
    room_id: u64,
    datasets: Vec<Dataset>,
}

impl RoomJob {
    pub fn new(harvester: Arc<Harvester>, room_id: u64, datasets: Vec<Dataset>) -> Self {
        Self {
            harvester,
            room_id,
            datasets,
        }
    }

    fn key_str(&self) -> String {
        self.room_id.to_string()
    }

    async fn pending(&self) -> Vec<Dataset> {
        let key = self.key_str();
        let mut pending = Vec::with_capacity(self.datasets.len());
        for &dataset in &self.datasets {
            if !self.harvester.is_done(dataset.kind(), &key).await {
                pending.push(dataset);
            }
        }
        pending
    }
}

#[async_trait]
impl Job for RoomJob {
    fn key(&self) -> String {
        format!("room-{}", self.room_id)
    }

    async fn is_complete(&self) -> bool {
        self.pending().await.is_empty()
    }

    async fn run(&self, _cancel: &CancellationToken) -> Result<JobSuccess> {
        let h = &self.harvester;
        let key = self.key_str();
        let pending = self.pending().await;

        let bootstrap = match h.bootstrap_room(self.room_id).await {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                for dataset in &pending {
                    h.record(TargetRecord::failed(dataset.kind(), key.as_str(), &e)).await;
                }
                return Err(e);
            }
        };

        let mut attempts = 1;
        let mut first_error: Option<HarvestError> = None;

        for dataset in pending {
            let outcome = match h.fetch_dataset(dataset, self.room_id, &bootstrap).await {
                Ok(harvested) => h
                    .write_dataset(self.room_id, &harvested.value)
                    .map(|path| (path, harvested.attempts)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((path, used)) => {
                    attempts += used;
                    h.record(TargetRecord::completed(dataset.kind(), key.as_str(), used, &path)).await;
                    tracing::debug!(room_id = self.room_id, dataset = %dataset, path = %path.display(), "dataset saved");
                }
                Err(e) => {
                    attempts += e.attempts().unwrap_or(0);
                    h.record(TargetRecord::failed(dataset.kind(), key.as_str(), &e)).await;
                    tracing::warn!(
                        room_id = self.room_id,
                        dataset = %dataset,
                        attempts = e.attempts(),
                        last_status = e.last_status(),
                        error = %e,
                        "dataset failed"
                    );
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(JobSuccess { attempts }),
        }
    }
}

/// Searches one city and writes its de-duplicated listings
pub struct CityJob {
    harvester: Arc<Harvester>,
    target: CityTarget,
    discovered: Arc<Mutex<BTreeSet<u64>>>,
}

impl CityJob {
    pub fn new(harvester: Arc<Harvester>, target: CityTarget, discovered: Arc<Mutex<BTreeSet<u64>>>) -> Self {
        Self {
            harvester,
            target,
            discovered,
        }
    }

    fn add_discovered(&self, ids: impl IntoIterator<Item = u64>) {
        self.discovered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids);
    }
}

#[async_trait]
impl Job for CityJob {
    fn key(&self) -> String {
        format!("city-{}", self.target.query)
    }

    async fn is_complete(&self) -> bool {
        if !self.harvester.is_done(TargetKind::City, &self.target.query).await {
            return false;
        }
        // Rooms found by an earlier run still feed a follow-up room batch.
        match read_city_room_ids(self.harvester.output(), &self.target.query) {
            Ok(ids) => self.add_discovered(ids),
            Err(e) => tracing::warn!(city = %self.target.query, error = %e, "could not read earlier search results"),
        }
        true
    }

    async fn run(&self, _cancel: &CancellationToken) -> Result<JobSuccess> {
        let h = &self.harvester;
        let city = self.target.query.as_str();

        let outcome = match h.search_city(&self.target).await {
            Ok(harvested) => h
                .output()
                .write_city(city, &harvested.value)
                .map_err(HarvestError::from)
                .map(|path| (path, harvested)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((path, harvested)) => {
                h.record(TargetRecord::completed(TargetKind::City, city, harvested.attempts, &path))
                    .await;
                self.add_discovered(harvested.value.iter().map(|l| l.room_id));
                Ok(JobSuccess {
                    attempts: harvested.attempts,
                })
            }
            Err(e) => {
                h.record(TargetRecord::failed(TargetKind::City, city, &e)).await;
                Err(e)
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct SavedListing {
    room_id: u64,
}

fn read_city_room_ids(output: &OutputStore, city: &str) -> Result<Vec<u64>> {
    let path = output.artifact_path(TargetKind::City, city);
    let bytes = std::fs::read(&path).map_err(crate::output::OutputError::from)?;
    let listings: Vec<SavedListing> =
        serde_json::from_slice(&bytes).map_err(crate::output::OutputError::from)?;
    Ok(listings.into_iter().map(|l| l.room_id).collect())
}

/// Result of a city batch plus every room id the searches found
#[derive(Debug)]
pub struct CityBatch {
    pub report: BatchReport,
    pub room_ids: Vec<u64>,
}

impl Harvester {
    /// Runs one job per room under the room concurrency ceiling
    pub async fn run_rooms(self: &Arc<Self>, room_ids: &[u64], datasets: &[Dataset]) -> BatchReport {
        let unique: BTreeSet<u64> = room_ids.iter().copied().collect();
        let jobs: Vec<RoomJob> = unique
            .into_iter()
            .map(|id| RoomJob::new(Arc::clone(self), id, datasets.to_vec()))
            .collect();

        let scheduler = Scheduler::from_config(
            &self.config().scheduler,
            self.config().scheduler.room_concurrency,
            self.cancel_token().clone(),
        );
        scheduler.run_batch(jobs).await
    }

    /// Runs one search job per city under the city concurrency ceiling
    pub async fn run_cities(self: &Arc<Self>, cities: Vec<CityTarget>) -> CityBatch {
        let discovered = Arc::new(Mutex::new(BTreeSet::new()));
        let jobs: Vec<CityJob> = cities
            .into_iter()
            .map(|target| CityJob::new(Arc::clone(self), target, Arc::clone(&discovered)))
            .collect();

        let scheduler = Scheduler::from_config(
            &self.config().scheduler,
            self.config().scheduler.city_concurrency,
            self.cancel_token().clone(),
        );
        let report = scheduler.run_batch(jobs).await;

        let room_ids = discovered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        CityBatch { report, room_ids }
    }
}
