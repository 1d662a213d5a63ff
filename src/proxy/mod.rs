//! Outbound proxy rotation
//!
//! The pool is created once at startup and shared by every worker. All
//! reads and cursor updates happen under the pool's own lock; nothing
//! outside this module can reach the underlying list.

mod list;
mod pool;

pub use list::{load_proxy_file, parse_proxy_list};
pub use pool::ProxyPool;

use thiserror::Error;

/// Errors raised while building a proxy pool
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to read proxy file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid proxy URI on line {line}: '{value}' ({reason})")]
    InvalidUri {
        line: usize,
        value: String,
        reason: String,
    },
}
