use serde::Deserialize;

/// Main configuration structure for Stay-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Upstream site, locale and outbound routing
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Scheme and host every page and API path is joined onto
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// ISO 4217-like currency code sent with every API call
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// Header that carries the API key on JSON calls
    #[serde(rename = "api-key-header", default = "default_api_key_header")]
    pub api_key_header: String,

    /// Last-known-good key used when bootstrapping fails
    #[serde(rename = "fallback-api-key", default)]
    pub fallback_api_key: Option<String>,

    /// A single outbound proxy used for every request
    #[serde(default)]
    pub proxy: Option<String>,

    /// Newline-delimited proxy list; takes precedence over `proxy`
    #[serde(rename = "proxy-file", default)]
    pub proxy_file: Option<String>,

    #[serde(rename = "proxy-strategy", default)]
    pub proxy_strategy: ProxyStrategy,
}

/// How a proxy is picked from the pool for each request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// Retry, backoff and transport limits
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per logical request, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before attempt k is `backoff-base-ms * 2^k`
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound (exclusive) of the uniform jitter added to each backoff
    #[serde(rename = "jitter-ms", default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Per-attempt timeout
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "max-idle-per-host", default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(rename = "retry-on", default)]
    pub retry_on: RetryScope,
}

/// Which non-200 responses are worth another attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryScope {
    /// Every transport error and every non-200 status is retried
    #[default]
    AnyFailure,
    /// Only transport errors, 429 and 5xx are retried; other statuses fail fast
    ServerErrors,
}

/// Pagination bounds
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Hard ceiling on pages per pagination loop
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(rename = "review-page-size", default = "default_review_page_size")]
    pub review_page_size: u32,

    #[serde(rename = "search-page-size", default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Months requested per calendar call
    #[serde(rename = "calendar-months", default = "default_calendar_months")]
    pub calendar_months: u32,
}

/// Fan-out limits
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(rename = "room-concurrency", default = "default_concurrency")]
    pub room_concurrency: usize,

    #[serde(rename = "city-concurrency", default = "default_concurrency")]
    pub city_concurrency: usize,

    /// Lower bound of the randomized delay before each job
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound (exclusive) of the randomized delay before each job
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Persisted-query descriptors for each upstream endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    pub calendar: EndpointConfig,
    pub reviews: EndpointConfig,
    pub search: EndpointConfig,
}

/// A single persisted-query endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Path joined onto the base URL
    pub path: String,

    /// SHA-256 content hash identifying the upstream query shape
    pub hash: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory; every target gets its own subdirectory
    #[serde(default = "default_output_directory")]
    pub directory: String,

    /// Path to the SQLite index of processed targets
    #[serde(rename = "index-path", default = "default_index_path")]
    pub index_path: String,
}

fn default_base_url() -> String {
    "https://www.airbnb.com".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_api_key_header() -> String {
    "X-Airbnb-Api-Key".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_jitter_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_idle_per_host() -> usize {
    30
}

fn default_max_pages() -> u32 {
    8
}

fn default_review_page_size() -> u32 {
    50
}

fn default_search_page_size() -> u32 {
    40
}

fn default_calendar_months() -> u32 {
    6
}

fn default_concurrency() -> usize {
    20
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    3000
}

fn default_output_directory() -> String {
    "./output".to_string()
}

fn default_index_path() -> String {
    "./output/index.db".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            currency: default_currency(),
            locale: default_locale(),
            api_key_header: default_api_key_header(),
            fallback_api_key: None,
            proxy: None,
            proxy_file: None,
            proxy_strategy: ProxyStrategy::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            jitter_ms: default_jitter_ms(),
            timeout_secs: default_timeout_secs(),
            max_idle_per_host: default_max_idle_per_host(),
            retry_on: RetryScope::default(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            review_page_size: default_review_page_size(),
            search_page_size: default_search_page_size(),
            calendar_months: default_calendar_months(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            room_concurrency: default_concurrency(),
            city_concurrency: default_concurrency(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            index_path: default_index_path(),
        }
    }
}
