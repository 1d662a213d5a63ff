//! Storage module for the harvest index
//!
//! This module handles the SQLite database that makes runs resumable:
//! - Schema management
//! - Run tracking (started, finished, config hash, status)
//! - Per-target outcomes keyed by dataset kind and target key

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
///
/// Missing parent directories are created.
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::new(path)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Which dataset a target row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Details,
    Calendar,
    Reviews,
    City,
}

impl TargetKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Calendar => "calendar",
            Self::Reviews => "reviews",
            Self::City => "city",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "details" => Some(Self::Details),
            "calendar" => Some(Self::Calendar),
            "reviews" => Some(Self::Reviews),
            "city" => Some(Self::City),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Final state of one target in its latest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetStatus {
    Completed,
    Failed,
    Cancelled,
}

impl TargetStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// The latest outcome for one target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub kind: TargetKind,
    pub key: String,
    pub status: TargetStatus,
    pub attempts: Option<u32>,
    pub last_status: Option<u16>,
    pub error_message: Option<String>,
    pub artifact_path: Option<String>,
    /// Set by the backend on write
    pub updated_at: String,
}

impl TargetRecord {
    pub fn completed(kind: TargetKind, key: impl Into<String>, attempts: u32, artifact: &Path) -> Self {
        Self {
            kind,
            key: key.into(),
            status: TargetStatus::Completed,
            attempts: Some(attempts),
            last_status: None,
            error_message: None,
            artifact_path: Some(artifact.to_string_lossy().into_owned()),
            updated_at: String::new(),
        }
    }

    pub fn failed(kind: TargetKind, key: impl Into<String>, error: &crate::HarvestError) -> Self {
        Self {
            kind,
            key: key.into(),
            status: if error.is_cancelled() {
                TargetStatus::Cancelled
            } else {
                TargetStatus::Failed
            },
            attempts: error.attempts(),
            last_status: error.last_status(),
            error_message: Some(error.to_string()),
            artifact_path: None,
            updated_at: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HarvestError;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), RunStatus::from_db_string(db_str));
        }
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_target_kind_roundtrip() {
        for kind in [TargetKind::Details, TargetKind::Calendar, TargetKind::Reviews, TargetKind::City] {
            assert_eq!(TargetKind::from_db_string(kind.to_db_string()), Some(kind));
        }
        assert_eq!(TargetKind::from_db_string("rooms"), None);
    }

    #[test]
    fn test_failed_record_from_cancellation() {
        let record = TargetRecord::failed(TargetKind::Reviews, "42", &HarvestError::Cancelled);
        assert_eq!(record.status, TargetStatus::Cancelled);
        assert_eq!(record.attempts, None);
        assert_eq!(record.error_message.as_deref(), Some("Operation cancelled"));
    }

    #[test]
    fn test_open_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.db");
        let storage = open_storage(&path);
        assert!(storage.is_ok());
        assert!(path.exists());
    }
}
