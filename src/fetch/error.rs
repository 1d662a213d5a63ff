use reqwest::header::HeaderMap;
use std::fmt;
use thiserror::Error;

/// The logical operation a request was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Bootstrap,
    Details,
    Calendar,
    Reviews,
    Search,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bootstrap => "bootstrap",
            Self::Details => "details",
            Self::Calendar => "calendar",
            Self::Reviews => "reviews",
            Self::Search => "search",
        };
        f.write_str(name)
    }
}

/// Status and headers of the last response seen before giving up
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseMeta {
    /// Value of the `Retry-After` header, if the upstream sent one
    pub fn retry_after(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
    }

    /// Redirect target, for 3xx responses
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// Why a single attempt did not succeed
#[derive(Debug, Error)]
pub enum FetchErrorKind {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("cancelled")]
    Cancelled,

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(#[source] reqwest::Error),
}

/// A logical request that failed, with the context needed to retry it by hand
#[derive(Debug, Error)]
#[error("{component} request to {url} failed after {attempts} attempt(s): {kind}")]
pub struct FetchError {
    /// Which operation issued the request
    pub component: Component,

    /// Target URL, without query string
    pub url: String,

    /// Attempts actually sent
    pub attempts: u32,

    /// The last recorded failure
    #[source]
    pub kind: FetchErrorKind,

    /// Last response metadata, when any response arrived at all
    pub response: Option<ResponseMeta>,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Cancelled)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, FetchErrorKind::RateLimited)
    }

    pub fn last_status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}
