use crate::config::RetryConfig;
use crate::fetch::error::{FetchError, FetchErrorKind, ResponseMeta};
use crate::fetch::request::RequestSpec;
use crate::fetch::retry::{backoff_delay, classify_status, RetryPolicy, RetryState, StatusClass};
use crate::fetch::user_agent::select_user_agent;
use reqwest::header::HeaderMap;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A cookie captured from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// A successful (HTTP 200) response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub cookies: Vec<SessionCookie>,
    pub body: Vec<u8>,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport limits applied to every client the fetcher builds
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub max_idle_per_host: usize,
}

impl From<&RetryConfig> for TransportSettings {
    fn from(config: &RetryConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_idle_per_host: config.max_idle_per_host,
        }
    }
}

/// Builds an HTTP client for one outbound route
///
/// Redirects are never followed: a 3xx comes back to the retry loop as-is.
/// Without an explicit proxy, environment proxy variables are ignored so
/// the route is always the one the caller asked for.
///
/// # Arguments
///
/// * `settings` - Timeout and idle pool limits
/// * `proxy` - Optional outbound proxy
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy or TLS backend failure
pub fn build_http_client(
    settings: &TransportSettings,
    proxy: Option<&Url>,
) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .timeout(settings.timeout)
        .redirect(Policy::none())
        .pool_max_idle_per_host(settings.max_idle_per_host)
        .gzip(true)
        .brotli(true);

    let builder = match proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy.as_str())?),
        None => builder.no_proxy(),
    };

    builder.build()
}

/// Executes logical requests with retry, backoff and user-agent rotation
///
/// One client is kept per outbound route so that rotated proxies never
/// share sockets.
pub struct Fetcher {
    policy: RetryPolicy,
    transport: TransportSettings,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl Fetcher {
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_policy(RetryPolicy::from(config), TransportSettings::from(config))
    }

    pub fn with_policy(policy: RetryPolicy, transport: TransportSettings) -> Self {
        Self {
            policy,
            transport,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes a request with the full retry policy
    ///
    /// Returns on the first HTTP 200. After the last attempt the most
    /// recent failure is returned together with the attempt count and the
    /// last response's status and headers.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        self.run(spec, self.policy.max_attempts, cancel).await
    }

    /// Executes a request exactly once, without retrying
    pub async fn execute_once(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        self.run(spec, 1, cancel).await
    }

    async fn run(
        &self,
        spec: &RequestSpec,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let client = self
            .client_for(spec.proxy.as_ref())
            .map_err(|e| fail(spec, RetryState::new(), FetchErrorKind::ClientBuild(e)))?;

        let mut state = RetryState::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = {
                    let mut rng = rand::rng();
                    backoff_delay(attempt, &self.policy, &mut rng)
                };
                state.record_delay(delay);
                tracing::debug!(
                    component = %spec.component,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(fail(spec, state, FetchErrorKind::Cancelled)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let user_agent = {
                let mut rng = rand::rng();
                select_user_agent(attempt, &mut rng)
            };

            let request = spec
                .build(&client, user_agent)
                .map_err(|e| fail(spec, RetryState::new(), FetchErrorKind::InvalidRequest(e)))?;

            state.record_attempt();

            let exchange = tokio::select! {
                _ = cancel.cancelled() => return Err(fail(spec, state, FetchErrorKind::Cancelled)),
                result = send(&client, request) => result,
            };

            let exchange = match exchange {
                Ok(exchange) => exchange,
                Err(e) => {
                    tracing::warn!(
                        component = %spec.component,
                        url = %spec.display_url(),
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "request failed"
                    );
                    state.record_failure(FetchErrorKind::Transport(e), None);
                    continue;
                }
            };

            let meta = ResponseMeta {
                status: exchange.status,
                headers: exchange.headers.clone(),
            };

            match classify_status(exchange.status, self.policy.scope) {
                StatusClass::Success => {
                    tracing::debug!(
                        component = %spec.component,
                        attempts = state.attempts,
                        bytes = exchange.body.len(),
                        "request succeeded"
                    );
                    return Ok(FetchResponse {
                        status: exchange.status,
                        headers: exchange.headers,
                        cookies: exchange.cookies,
                        body: exchange.body,
                        attempts: state.attempts,
                    });
                }
                StatusClass::RateLimited => {
                    tracing::warn!(
                        component = %spec.component,
                        url = %spec.display_url(),
                        attempt = attempt + 1,
                        max_attempts,
                        retry_after = meta.retry_after().unwrap_or("-"),
                        "rate limited"
                    );
                    state.record_failure(FetchErrorKind::RateLimited, Some(meta));
                }
                StatusClass::Retryable => {
                    tracing::warn!(
                        component = %spec.component,
                        url = %spec.display_url(),
                        attempt = attempt + 1,
                        max_attempts,
                        status = exchange.status,
                        location = meta.location(),
                        "unexpected status"
                    );
                    state.record_failure(FetchErrorKind::Status(exchange.status), Some(meta));
                }
                StatusClass::Fatal => {
                    let status = exchange.status;
                    tracing::warn!(
                        component = %spec.component,
                        url = %spec.display_url(),
                        status,
                        location = meta.location(),
                        "status not retried"
                    );
                    state.record_failure(FetchErrorKind::Status(status), Some(meta));
                    return Err(exhausted(spec, state));
                }
            }
        }

        Err(exhausted(spec, state))
    }

    /// Returns the cached client for a route, building it on first use
    fn client_for(&self, proxy: Option<&Url>) -> Result<Client, reqwest::Error> {
        let key = proxy.map(|p| p.as_str().to_string());
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.transport, proxy)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// What came back from one attempt, body read only for HTTP 200
struct Exchange {
    status: u16,
    headers: HeaderMap,
    cookies: Vec<SessionCookie>,
    body: Vec<u8>,
}

async fn send(client: &Client, request: reqwest::Request) -> Result<Exchange, reqwest::Error> {
    let response = client.execute(request).await?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let cookies = response
        .cookies()
        .map(|c| SessionCookie {
            name: c.name().to_string(),
            value: c.value().to_string(),
        })
        .collect();

    let body = if status == 200 {
        response.bytes().await?.to_vec()
    } else {
        Vec::new()
    };

    Ok(Exchange {
        status,
        headers,
        cookies,
        body,
    })
}

fn fail(spec: &RequestSpec, state: RetryState, kind: FetchErrorKind) -> FetchError {
    let (attempts, _, response) = state.into_parts();
    FetchError {
        component: spec.component,
        url: spec.display_url(),
        attempts,
        kind,
        response,
    }
}

fn exhausted(spec: &RequestSpec, state: RetryState) -> FetchError {
    let (attempts, last_error, response) = state.into_parts();
    let kind = match (last_error, &response) {
        (Some(kind), _) => kind,
        (None, Some(meta)) => FetchErrorKind::Status(meta.status),
        (None, None) => FetchErrorKind::Cancelled,
    };
    FetchError {
        component: spec.component,
        url: spec.display_url(),
        attempts,
        kind,
        response,
    }
}
