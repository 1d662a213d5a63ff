//! Outbound query construction for persisted-query endpoints
//!
//! Every API call is a GET whose query string carries four parameters:
//! `extensions` (persisted-query version and hash), `variables` (an
//! endpoint-specific JSON payload), `locale` and `currency`. The hashes are
//! configuration, never computed here.

mod ids;
mod variables;

pub use ids::{decode_search_cursor, encode_search_cursor, encode_typed_id, room_id_from_url};
pub use variables::{BoundingBox, CalendarParams, ReviewsParams, SearchParams};

use crate::config::{ClientConfig, EndpointConfig};
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Errors raised while building a request URL
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to encode variables: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted-query protocol version understood by the upstream
pub const PERSISTED_QUERY_VERSION: u32 = 1;

/// The `extensions` payload: a reference to a query shape stored upstream
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extensions {
    pub persisted_query: PersistedQuery,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQuery {
    pub version: u32,
    pub sha256_hash: String,
}

impl Extensions {
    pub fn for_hash(hash: &str) -> Self {
        Self {
            persisted_query: PersistedQuery {
                version: PERSISTED_QUERY_VERSION,
                sha256_hash: hash.to_string(),
            },
        }
    }
}

/// Builds page and API URLs against one upstream site
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base_url: Url,
    locale: String,
    currency: String,
}

impl QueryBuilder {
    pub fn new(base_url: Url, locale: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            base_url,
            locale: locale.into(),
            currency: currency.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, QueryError> {
        Ok(Self::new(
            Url::parse(&config.base_url)?,
            config.locale.clone(),
            config.currency.clone(),
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Canonical page of a listing; also the bootstrap page for its API calls
    pub fn room_url(&self, room_id: u64) -> Result<Url, QueryError> {
        Ok(self.base_url.join(&format!("/rooms/{}", room_id))?)
    }

    /// Landing page used to bootstrap credentials for city searches
    pub fn homepage_url(&self) -> Url {
        self.base_url.clone()
    }

    pub fn calendar(
        &self,
        endpoint: &EndpointConfig,
        params: &CalendarParams,
    ) -> Result<Url, QueryError> {
        self.api_url(endpoint, &params.variables())
    }

    pub fn reviews(
        &self,
        endpoint: &EndpointConfig,
        params: &ReviewsParams,
    ) -> Result<Url, QueryError> {
        self.api_url(endpoint, &params.variables())
    }

    pub fn search(
        &self,
        endpoint: &EndpointConfig,
        params: &SearchParams,
    ) -> Result<Url, QueryError> {
        self.api_url(endpoint, &params.variables(&self.currency))
    }

    /// Encodes one persisted-query call
    ///
    /// Parameters are appended in a fixed order so identical inputs always
    /// produce byte-identical URLs.
    fn api_url<V: Serialize>(
        &self,
        endpoint: &EndpointConfig,
        variables: &V,
    ) -> Result<Url, QueryError> {
        let mut url = self.base_url.join(&endpoint.path)?;
        let extensions = serde_json::to_string(&Extensions::for_hash(&endpoint.hash))?;
        let variables = serde_json::to_string(variables)?;

        url.query_pairs_mut()
            .append_pair("operationName", operation_name(&endpoint.path))
            .append_pair("locale", &self.locale)
            .append_pair("currency", &self.currency)
            .append_pair("variables", &variables)
            .append_pair("extensions", &extensions);

        Ok(url)
    }
}

/// Last path segment, which the upstream expects echoed as `operationName`
fn operation_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
