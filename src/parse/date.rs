use crate::parse::ParseError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Calendar dates are always plain `YYYY-MM-DD`
const CALENDAR_DATE: &str = "%Y-%m-%d";

/// Parses an upstream timestamp, trying each known format in order
///
/// 1. `2024-05-01T10:00:00Z`
/// 2. `2024-05-01T10:00:00+02:00`
/// 3. `2024-05-01` (midnight UTC)
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = value.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(naive.and_utc());
    }

    if let Ok(with_offset) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%:z") {
        return Ok(with_offset.with_timezone(&Utc));
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, CALENDAR_DATE)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(ParseError::Date {
        value: value.to_string(),
    })
}

/// Like [`parse_timestamp`], but logs and yields the zero timestamp on failure
///
/// An empty string is treated as absent and is not logged.
pub fn parse_timestamp_or_default(value: &str, context: &str) -> DateTime<Utc> {
    if value.trim().is_empty() {
        return DateTime::<Utc>::default();
    }
    match parse_timestamp(value) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!(context, error = %e, "unparseable timestamp; keeping zero value");
            DateTime::<Utc>::default()
        }
    }
}

pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), CALENDAR_DATE).ok()
}
