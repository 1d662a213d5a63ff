//! Output module for harvested artifacts and run statistics
//!
//! This module handles:
//! - Writing per-target JSON and CSV artifacts atomically
//! - Reporting index statistics

pub mod stats;
mod store;

pub use stats::{format_statistics, load_statistics, print_statistics, HarvestStatistics};
pub use store::{slugify, OutputStore};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Not a file path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
