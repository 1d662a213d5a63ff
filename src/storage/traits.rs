//! Storage traits and error types
//!
//! This module defines the trait interface for the harvest index and
//! associated error types.

use crate::storage::{RunRecord, RunStatus, TargetKind, TargetRecord, TargetStatus};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Index is locked by a panicked writer")]
    Poisoned,

    #[error("Index task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for harvest index backends
///
/// The index remembers which targets finished, so a re-run with the same
/// inputs only does the work that is still missing.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Target Tracking =====

    /// Inserts or replaces the row for `(record.kind, record.key)`
    fn record_target(&mut self, run_id: i64, record: &TargetRecord) -> StorageResult<()>;

    /// Gets the latest row for a target
    fn get_target(&self, kind: TargetKind, key: &str) -> StorageResult<Option<TargetRecord>>;

    /// Returns true if the target completed and its artifact is still on disk
    fn is_completed(&self, kind: TargetKind, key: &str) -> StorageResult<bool> {
        let completed = self
            .get_target(kind, key)?
            .filter(|t| t.status == TargetStatus::Completed)
            .and_then(|t| t.artifact_path)
            .map(|p| Path::new(&p).is_file())
            .unwrap_or(false);
        Ok(completed)
    }

    /// Gets all targets in a given state
    fn get_targets_by_status(&self, status: TargetStatus) -> StorageResult<Vec<TargetRecord>>;

    // ===== Statistics =====

    /// Counts targets grouped by kind and status, sorted by kind then status
    fn count_targets(&self) -> StorageResult<Vec<(TargetKind, TargetStatus, u64)>>;

    /// Counts all runs ever recorded
    fn count_runs(&self) -> StorageResult<u64>;
}
