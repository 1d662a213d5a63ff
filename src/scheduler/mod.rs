//! Concurrent fan-out scheduler
//!
//! Runs a batch of independent jobs on a bounded worker pool:
//! - A counting semaphore caps the number of jobs holding a slot
//! - Each job may be skipped when its output already exists
//! - A randomized delay before each job avoids synchronized bursts
//! - One job's failure never cancels its siblings
//!
//! Results are collected in completion order; use
//! [`BatchReport::sorted_by_key`] when a stable order is needed.

mod report;

pub use report::{BatchReport, JobOutcome, JobReport};

use crate::config::SchedulerConfig;
use crate::HarvestError;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What a successful job reports back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSuccess {
    /// Total HTTP attempts the job spent
    pub attempts: u32,
}

/// One unit of work in a batch
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Stable identifier used in logs and reports
    fn key(&self) -> String;

    /// Whether the job's output already exists, so the job can be skipped
    async fn is_complete(&self) -> bool {
        false
    }

    /// Runs the fetch, parse and persist sequence
    async fn run(&self, cancel: &CancellationToken) -> Result<JobSuccess, HarvestError>;
}

/// Bounded worker pool for one batch type
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
    min_delay: Duration,
    max_delay: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum jobs in flight; 0 is treated as 1
    /// * `min_delay` / `max_delay` - Bounds of the uniform pre-job delay
    /// * `cancel` - Stops queued jobs from starting and aborts running ones
    pub fn new(
        concurrency: usize,
        min_delay: Duration,
        max_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            min_delay: min_delay.min(max_delay),
            max_delay,
            cancel,
        }
    }

    /// Scheduler with the configured delays and the given ceiling
    pub fn from_config(config: &SchedulerConfig, concurrency: usize, cancel: CancellationToken) -> Self {
        Self::new(
            concurrency,
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            cancel,
        )
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs every job and waits for all of them to finish
    pub async fn run_batch<J: Job>(&self, jobs: Vec<J>) -> BatchReport {
        let total = jobs.len();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        tracing::info!(total, concurrency = self.concurrency, "starting batch");

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let (min_delay, max_delay) = (self.min_delay, self.max_delay);
            tasks.spawn(async move { run_slot(job, semaphore, cancel, min_delay, max_delay).await });
        }

        let mut reports = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "job task aborted");
                    JobReport::failed("<aborted>", Duration::ZERO, None, None, e.to_string())
                }
            };

            log_progress(reports.len() + 1, total, &report);
            reports.push(report);
        }

        let report = BatchReport::new(reports, started.elapsed());
        tracing::info!(
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch finished"
        );
        report
    }
}

fn random_delay(min: Duration, max: Duration) -> Duration {
    if max.is_zero() || min >= max {
        return max;
    }
    let mut rng = rand::rng();
    let millis = rng.random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// One job's life: acquire, skip check, delay, run, release
async fn run_slot<J: Job>(
    job: J,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    min_delay: Duration,
    max_delay: Duration,
) -> JobReport {
    let key = job.key();

    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return JobReport::cancelled(key, Duration::ZERO),
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return JobReport::cancelled(key, Duration::ZERO),
        },
    };

    if job.is_complete().await {
        return JobReport::skipped(key);
    }

    let delay = random_delay(min_delay, max_delay);
    if !delay.is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return JobReport::cancelled(key, Duration::ZERO),
            _ = tokio::time::sleep(delay) => {}
        }
    }
    if cancel.is_cancelled() {
        return JobReport::cancelled(key, Duration::ZERO);
    }

    let started = Instant::now();
    match job.run(&cancel).await {
        Ok(success) => JobReport::succeeded(key, started.elapsed(), success.attempts),
        Err(e) if e.is_cancelled() => JobReport::cancelled(key, started.elapsed()),
        Err(e) => JobReport::failed(
            key,
            started.elapsed(),
            e.attempts(),
            e.last_status(),
            e.to_string(),
        ),
    }
}

fn log_progress(done: usize, total: usize, report: &JobReport) {
    match report.outcome {
        JobOutcome::Failed => tracing::warn!(
            key = %report.key,
            attempts = report.attempts,
            last_status = report.last_status,
            error = report.error.as_deref().unwrap_or_default(),
            "[{}/{}] failed",
            done,
            total
        ),
        outcome => tracing::info!(
            key = %report.key,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "[{}/{}] {}",
            done,
            total,
            outcome
        ),
    }
}
