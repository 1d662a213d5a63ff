use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded,
    Skipped,
    Failed,
    Cancelled,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How a single job ended
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub key: String,
    pub outcome: JobOutcome,
    /// Time spent running the job, excluding queueing and the pre-job delay
    pub elapsed: Duration,
    pub attempts: Option<u32>,
    pub last_status: Option<u16>,
    pub error: Option<String>,
}

impl JobReport {
    pub fn succeeded(key: impl Into<String>, elapsed: Duration, attempts: u32) -> Self {
        Self {
            key: key.into(),
            outcome: JobOutcome::Succeeded,
            elapsed,
            attempts: Some(attempts),
            last_status: None,
            error: None,
        }
    }

    pub fn skipped(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            outcome: JobOutcome::Skipped,
            elapsed: Duration::ZERO,
            attempts: None,
            last_status: None,
            error: None,
        }
    }

    pub fn failed(
        key: impl Into<String>,
        elapsed: Duration,
        attempts: Option<u32>,
        last_status: Option<u16>,
        error: String,
    ) -> Self {
        Self {
            key: key.into(),
            outcome: JobOutcome::Failed,
            elapsed,
            attempts,
            last_status,
            error: Some(error),
        }
    }

    pub fn cancelled(key: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            key: key.into(),
            outcome: JobOutcome::Cancelled,
            elapsed,
            attempts: None,
            last_status: None,
            error: None,
        }
    }
}

/// Outcome of a whole batch, in completion order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn new(jobs: Vec<JobReport>, elapsed: Duration) -> Self {
        Self { jobs, elapsed }
    }

    fn count(&self, outcome: JobOutcome) -> usize {
        self.jobs.iter().filter(|j| j.outcome == outcome).count()
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobOutcome::Succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobOutcome::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(JobOutcome::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(JobOutcome::Cancelled)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled() > 0
    }

    /// Share of attempted jobs that succeeded; skipped jobs are not attempted
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded() + self.failed();
        if attempted == 0 {
            return 1.0;
        }
        self.succeeded() as f64 / attempted as f64
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.outcome == JobOutcome::Failed)
    }

    pub fn get(&self, key: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.key == key)
    }

    pub fn sorted_by_key(&self) -> Vec<&JobReport> {
        let mut jobs: Vec<_> = self.jobs.iter().collect();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        jobs
    }

    /// Folds another batch into this one
    pub fn merge(&mut self, other: BatchReport) {
        self.jobs.extend(other.jobs);
        self.elapsed += other.elapsed;
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs: {} succeeded, {} skipped, {} failed, {} cancelled in {:.1}s",
            self.total(),
            self.succeeded(),
            self.skipped(),
            self.failed(),
            self.cancelled(),
            self.elapsed.as_secs_f64()
        )
    }
}
