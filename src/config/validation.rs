use crate::config::types::{
    ClientConfig, Config, EndpointConfig, OutputConfig, PaginationConfig, RetryConfig,
    SchedulerConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_client_config(&config.client)?;
    validate_retry_config(&config.retry)?;
    validate_pagination_config(&config.pagination)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_endpoint("calendar", &config.endpoints.calendar)?;
    validate_endpoint("reviews", &config.endpoints.reviews)?;
    validate_endpoint("search", &config.endpoints.search)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates upstream and proxy settings
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }

    validate_currency(&config.currency)?;

    if config.locale.is_empty() {
        return Err(ConfigError::Validation("locale cannot be empty".to_string()));
    }

    if config.api_key_header.is_empty() {
        return Err(ConfigError::Validation(
            "api-key-header cannot be empty".to_string(),
        ));
    }

    if let Some(key) = &config.fallback_api_key {
        if key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "fallback-api-key cannot be blank when set".to_string(),
            ));
        }
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Currency must look like an ISO 4217 code
fn validate_currency(currency: &str) -> Result<(), ConfigError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(format!(
            "currency must be a three-letter uppercase code, got '{}'",
            currency
        )));
    }
    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_pagination_config(config: &PaginationConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1".to_string(),
        ));
    }

    if config.review_page_size < 1 || config.search_page_size < 1 {
        return Err(ConfigError::Validation(
            "page sizes must be >= 1".to_string(),
        ));
    }

    if config.calendar_months < 1 || config.calendar_months > 12 {
        return Err(ConfigError::Validation(format!(
            "calendar-months must be between 1 and 12, got {}",
            config.calendar_months
        )));
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("room-concurrency", config.room_concurrency),
        ("city-concurrency", config.city_concurrency),
    ] {
        if !(1..=100).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and 100, got {}",
                name, value
            )));
        }
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

/// Validates a persisted-query endpoint descriptor
fn validate_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<(), ConfigError> {
    if !endpoint.path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "endpoints.{}.path must start with '/', got '{}'",
            name, endpoint.path
        )));
    }

    let decoded = hex::decode(&endpoint.hash).map_err(|e| {
        ConfigError::Validation(format!("endpoints.{}.hash is not hex: {}", name, e))
    })?;

    if decoded.len() != 32 {
        return Err(ConfigError::Validation(format!(
            "endpoints.{}.hash must be a SHA-256 digest (64 hex characters), got {}",
            name,
            endpoint.hash.len()
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.index_path.is_empty() {
        return Err(ConfigError::Validation(
            "index-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
