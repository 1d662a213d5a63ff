//! Resilient HTTP fetching
//!
//! This module handles every outbound request, including:
//! - Building browser-like requests for pages and API calls
//! - Retrying transport errors and non-200 statuses with exponential backoff
//! - Rotating user agents between attempts
//! - Surfacing the last failure with attempt and response metadata
//!
//! Request construction ([`RequestSpec`]) is kept apart from execution
//! ([`Fetcher`]); only the latter holds mutable attempt state.

mod error;
mod fetcher;
mod request;
mod retry;
mod user_agent;

pub use error::{Component, FetchError, FetchErrorKind, ResponseMeta};
pub use fetcher::{build_http_client, FetchResponse, Fetcher, SessionCookie, TransportSettings};
pub use request::{HeaderProfile, RequestSpec};
pub use retry::{backoff_delay, classify_status, RetryPolicy, RetryState, StatusClass};
pub use user_agent::{select_user_agent, DEFAULT_USER_AGENT, USER_AGENTS};
