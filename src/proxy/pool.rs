use crate::config::ProxyStrategy;
use crate::proxy::list::{load_proxy_file, parse_proxy_list};
use crate::proxy::ProxyError;
use rand::Rng;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use url::Url;

/// Thread-safe pool of outbound proxy endpoints
///
/// Every operation takes the lock for O(1) work and releases it before
/// returning, so contention never extends past a single index update.
#[derive(Debug)]
pub struct ProxyPool {
    inner: Mutex<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    endpoints: Vec<Url>,
    cursor: usize,
}

impl ProxyPool {
    /// Creates a pool whose round-robin cursor starts at a random index
    ///
    /// Randomizing the start spreads load when several processes are
    /// launched with the same list at the same moment.
    pub fn new(endpoints: Vec<Url>) -> Self {
        let start = if endpoints.is_empty() {
            0
        } else {
            rand::rng().random_range(0..endpoints.len())
        };
        Self::with_cursor(endpoints, start)
    }

    /// Creates a pool with no proxies; every request goes out directly
    pub fn empty() -> Self {
        Self::with_cursor(Vec::new(), 0)
    }

    fn with_cursor(endpoints: Vec<Url>, cursor: usize) -> Self {
        Self {
            inner: Mutex::new(PoolState { endpoints, cursor }),
        }
    }

    /// Builds a pool from newline-delimited proxy URIs
    pub fn from_list(content: &str) -> Result<Self, ProxyError> {
        Ok(Self::new(parse_proxy_list(content)?))
    }

    /// Builds a pool from a proxy list file
    pub fn load(path: &Path) -> Result<Self, ProxyError> {
        Ok(Self::new(load_proxy_file(path)?))
    }

    /// Returns the proxy at the cursor and advances it, wrapping around
    pub fn next(&self) -> Option<Url> {
        let mut state = self.lock();
        if state.endpoints.is_empty() {
            return None;
        }
        let proxy = state.endpoints[state.cursor].clone();
        state.cursor = (state.cursor + 1) % state.endpoints.len();
        Some(proxy)
    }

    /// Returns a uniformly random proxy without moving the cursor
    pub fn random(&self) -> Option<Url> {
        let state = self.lock();
        if state.endpoints.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..state.endpoints.len());
        Some(state.endpoints[index].clone())
    }

    /// Returns the proxy the cursor points at without advancing
    pub fn current(&self) -> Option<Url> {
        let state = self.lock();
        state.endpoints.get(state.cursor).cloned()
    }

    /// Picks a proxy according to the configured strategy
    pub fn pick(&self, strategy: ProxyStrategy) -> Option<Url> {
        match strategy {
            ProxyStrategy::RoundRobin => self.next(),
            ProxyStrategy::Random => self.random(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // The state is a list plus an index; a panic mid-update cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::empty()
    }
}
