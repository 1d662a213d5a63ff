//! Tolerant response parsing
//!
//! Upstream payloads are decoded in two steps. First into raw structs that
//! mirror the upstream JSON field-for-field, where every optional field has
//! a default and fields of inconsistent type are [`Loose`]. Then into clean
//! records with stable names and parsed numeric types. Only a missing
//! top-level structure fails a decode; anything nested falls back to its
//! zero value.

pub mod calendar;
pub mod date;
pub mod details;
mod loose;
mod normalize;
pub mod price;
pub mod reviews;
pub mod search;

pub use calendar::{parse_calendar, Calendar, CalendarDay, CalendarMonth};
pub use date::{parse_calendar_date, parse_timestamp, parse_timestamp_or_default};
pub use details::{parse_details, ListingDetails};
pub use loose::{de, Loose};
pub use normalize::{normalize_text, normalize_whitespace};
pub use price::{parse_price, Price};
pub use reviews::{parse_reviews_page, Review, ReviewUser, ReviewsPage};
pub use search::{parse_search_page, ListingSummary, SearchPage};

use thiserror::Error;

/// Errors raised while decoding a response
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required structure: {0}")]
    MissingStructure(&'static str),

    #[error("upstream returned errors: {0}")]
    Upstream(String),

    #[error("could not parse date '{value}'")]
    Date { value: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid selector: {0}")]
    Selector(String),
}

/// Normalizes and decodes a JSON API body, rejecting upstream error envelopes
///
/// A GraphQL-style `errors` array with no `data` means the call itself was
/// refused (bad hash, expired key); that is never a partial success.
pub(crate) fn decode_api_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ParseError> {
    let normalized = normalize_whitespace(body);
    let value: serde_json::Value = serde_json::from_slice(&normalized)?;

    let data_missing = value.get("data").map_or(true, |d| d.is_null());
    if data_missing {
        if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect();
            return Err(ParseError::Upstream(messages.join("; ")));
        }
        return Err(ParseError::MissingStructure("data"));
    }

    Ok(serde_json::from_value(value)?)
}
