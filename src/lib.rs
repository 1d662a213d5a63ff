//! Stay-Harvest: a resilient client for a travel marketplace's internal API
//!
//! This crate pulls listing details, availability calendars, reviews and
//! city search results out of an undocumented JSON API that sits behind a
//! browser-facing website. The pieces, leaves first:
//!
//! - [`proxy`] hands out outbound proxies, round-robin or random
//! - [`fetch`] executes one logical request with retry, backoff and
//!   user-agent rotation
//! - [`session`] derives an API key and session cookies from an HTML page
//! - [`query`] encodes persisted-query parameters per endpoint
//! - [`parse`] decodes inconsistently typed JSON into stable records
//! - [`paginate`] loops fetch and parse until the upstream runs dry
//! - [`scheduler`] fans independent jobs out under a concurrency ceiling
//! - [`storage`] and [`output`] persist artifacts and the resume index
//!
//! [`harvest::Harvester`] owns all of the shared state and is passed
//! explicitly to whatever drives a batch.

pub mod config;
pub mod fetch;
pub mod harvest;
pub mod output;
pub mod paginate;
pub mod parse;
pub mod proxy;
pub mod query;
pub mod scheduler;
pub mod session;
pub mod storage;

use thiserror::Error;

/// Main error type for Stay-Harvest operations
///
/// Each variant wraps the error of the component that failed, so callers
/// can match on the failure kind instead of inspecting messages.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error(transparent)]
    Fetch(#[from] fetch::FetchError),

    #[error("Credential error: {0}")]
    Credentials(#[from] session::CredentialError),

    #[error("Query error: {0}")]
    Query(#[from] query::QueryError),

    #[error("Parse error: {0}")]
    Parse(#[from] parse::ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Operation cancelled")]
    Cancelled,

    /// A later page failed after earlier pages succeeded; the dataset is
    /// not complete and must not be recorded as such
    #[error("Stopped after {pages} page(s): {source}")]
    Incomplete {
        pages: u32,
        attempts: u32,
        #[source]
        source: Box<HarvestError>,
    },
}

impl HarvestError {
    /// Returns true if the error was caused by an operator abort
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Fetch(e) => e.is_cancelled(),
            Self::Credentials(session::CredentialError::Fetch(e)) => e.is_cancelled(),
            Self::Incomplete { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The underlying fetch error, if the failure came from the network
    pub fn fetch_error(&self) -> Option<&fetch::FetchError> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Credentials(session::CredentialError::Fetch(e)) => Some(e),
            Self::Incomplete { source, .. } => source.fetch_error(),
            _ => None,
        }
    }

    /// Number of attempts made before giving up, when known
    ///
    /// For an incomplete pagination this covers every page, the failed one
    /// included.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Incomplete { attempts, .. } => Some(*attempts),
            _ => self.fetch_error().map(|e| e.attempts),
        }
    }

    /// Status code of the last response seen, when there was one
    pub fn last_status(&self) -> Option<u16> {
        self.fetch_error().and_then(|e| e.last_status())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Stay-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{Component, FetchError, FetchErrorKind, Fetcher};
pub use harvest::{CityTarget, Dataset, Harvester};
pub use proxy::ProxyPool;
pub use scheduler::{BatchReport, JobOutcome, Scheduler};
pub use session::Credentials;
