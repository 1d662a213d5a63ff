//! Session and credential bootstrapping
//!
//! JSON API calls need an API key that only appears inside the HTML of a
//! public page. Bootstrapping fetches that page once, pulls the key out of
//! the markup and keeps the response cookies for the calls that follow.
//! Credentials belong to whoever bootstrapped them; nothing here is global.

use crate::fetch::{Component, FetchError, Fetcher, RequestSpec, SessionCookie};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Errors raised while deriving credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("bootstrap page fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no API key found in page {url}")]
    KeyNotFound { url: String },

    #[error("invalid API key pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Where an API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Extracted,
    Fallback,
}

/// An API key plus the session cookies issued alongside it
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub cookies: Vec<SessionCookie>,
    pub source: KeySource,
}

impl Credentials {
    /// Credentials built from a configured static key, with no cookies
    pub fn fallback(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            cookies: Vec::new(),
            source: KeySource::Fallback,
        }
    }

    /// Cookies formatted for a `Cookie` request header
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        Some(pairs.join("; "))
    }

    /// Attaches the key and cookies to an API request
    pub fn apply(&self, spec: RequestSpec, key_header: &str) -> RequestSpec {
        let spec = spec.with_header(key_header, self.api_key.as_str());
        match self.cookie_header() {
            Some(cookies) => spec.with_header("Cookie", cookies),
            None => spec,
        }
    }
}

/// Result of a bootstrap: credentials plus the page that produced them
///
/// The page is the listing's own room page, so callers that also want the
/// listing details can parse it instead of fetching it again. It is `None`
/// when the fallback key was used.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub credentials: Credentials,
    pub page: Option<String>,
}

fn api_key_pattern() -> Result<&'static Regex, regex::Error> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let compiled = Regex::new(r#""key":"(.+?)""#)?;
    Ok(PATTERN.get_or_init(|| compiled))
}

/// Extracts the first `"key":"<value>"` occurrence from page markup
pub fn extract_api_key(html: &str) -> Result<Option<String>, CredentialError> {
    let pattern = api_key_pattern()?;
    Ok(pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Fetches a page once and derives credentials from it
///
/// # Arguments
///
/// * `fetcher` - Executes the single page request
/// * `page_url` - Canonical page of the target (e.g. its room page)
/// * `proxy` - Outbound route for this request
/// * `cancel` - Aborts the request
///
/// # Returns
///
/// * `Ok(Bootstrap)` - Key found; cookies and page body attached
/// * `Err(CredentialError::Fetch)` - The page request failed
/// * `Err(CredentialError::KeyNotFound)` - The page had no key
pub async fn bootstrap(
    fetcher: &Fetcher,
    page_url: &Url,
    proxy: Option<Url>,
    cancel: &CancellationToken,
) -> Result<Bootstrap, CredentialError> {
    let spec = RequestSpec::document(Component::Bootstrap, page_url.clone()).with_proxy(proxy);
    let response = fetcher.execute_once(&spec, cancel).await?;
    let page = response.text();

    let api_key = extract_api_key(&page)?.ok_or_else(|| CredentialError::KeyNotFound {
        url: spec.display_url(),
    })?;

    tracing::debug!(
        url = %spec.display_url(),
        cookies = response.cookies.len(),
        "derived API key from page"
    );

    Ok(Bootstrap {
        credentials: Credentials {
            api_key,
            cookies: response.cookies,
            source: KeySource::Extracted,
        },
        page: Some(page),
    })
}

/// Bootstraps, substituting a configured static key on failure
///
/// Cancellation is never masked by the fallback. Without a fallback key the
/// original error is returned unchanged.
pub async fn bootstrap_or_fallback(
    fetcher: &Fetcher,
    page_url: &Url,
    proxy: Option<Url>,
    fallback_key: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Bootstrap, CredentialError> {
    match bootstrap(fetcher, page_url, proxy, cancel).await {
        Ok(bootstrap) => Ok(bootstrap),
        Err(CredentialError::Fetch(e)) if e.is_cancelled() => Err(CredentialError::Fetch(e)),
        Err(e) => match fallback_key {
            Some(key) => {
                tracing::warn!(
                    url = %page_url,
                    error = %e,
                    "bootstrap failed; using fallback API key"
                );
                Ok(Bootstrap {
                    credentials: Credentials::fallback(key),
                    page: None,
                })
            }
            None => Err(e),
        },
    }
}
