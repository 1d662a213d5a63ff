//! Availability calendar decoding and lookups

use crate::parse::de::{lenient_bool, lenient_i64, lenient_object, lenient_seq, lenient_string};
use crate::parse::{decode_api_body, parse_calendar_date, parse_price, Loose, ParseError, Price};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ===== Raw upstream shape =====

#[derive(Debug, Deserialize)]
struct RawRoot {
    data: RawData,
}

#[derive(Debug, Default, Deserialize)]
struct RawData {
    #[serde(default)]
    merlin: Option<RawMerlin>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMerlin {
    #[serde(default)]
    pdp_availability_calendar: Option<RawAvailabilityCalendar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAvailabilityCalendar {
    #[serde(default, deserialize_with = "lenient_seq")]
    calendar_months: Vec<RawMonth>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMonth {
    #[serde(default, deserialize_with = "lenient_i64")]
    month: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    year: i64,
    #[serde(default, deserialize_with = "lenient_seq")]
    days: Vec<RawDay>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDay {
    #[serde(default, deserialize_with = "lenient_string")]
    calendar_date: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    available: bool,
    #[serde(default, deserialize_with = "lenient_i64")]
    max_nights: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    min_nights: i64,
    #[serde(default, deserialize_with = "lenient_bool")]
    available_for_checkin: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    available_for_checkout: bool,
    #[serde(default)]
    bookable: Loose,
    #[serde(default, deserialize_with = "lenient_object")]
    price: RawDayPrice,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDayPrice {
    #[serde(default)]
    local_price_formatted: Loose,
}

// ===== Clean records =====

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Calendar {
    pub room_id: u64,
    pub months: Vec<CalendarMonth>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalendarMonth {
    pub month: u32,
    pub year: i32,
    pub days: Vec<CalendarDay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalendarDay {
    /// `YYYY-MM-DD`, verbatim
    pub date: String,
    pub available: bool,
    pub min_nights: u32,
    pub max_nights: u32,
    pub available_for_checkin: bool,
    pub available_for_checkout: bool,
    pub bookable: bool,
    /// Zero value when the day carries no price
    pub price: Price,
}

impl CalendarDay {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_calendar_date(&self.date)
    }
}

impl Calendar {
    pub fn days(&self) -> impl Iterator<Item = &CalendarDay> {
        self.months.iter().flat_map(|m| m.days.iter())
    }

    pub fn day(&self, date: NaiveDate) -> Option<&CalendarDay> {
        self.days().find(|d| d.parsed_date() == Some(date))
    }

    /// Whether `date` is open; an unknown date is not available
    pub fn is_available(&self, date: NaiveDate) -> bool {
        self.day(date).is_some_and(|d| d.available)
    }

    /// Available dates in `[start, end]`, in ascending order
    ///
    /// Reversed bounds are swapped rather than yielding nothing.
    pub fn available_dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let (start, end) = if start > end { (end, start) } else { (start, end) };

        let open: HashSet<NaiveDate> = self
            .days()
            .filter(|d| d.available)
            .filter_map(CalendarDay::parsed_date)
            .collect();

        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| open.contains(d))
            .collect()
    }
}

// ===== Raw -> clean =====

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl From<RawDay> for CalendarDay {
    fn from(raw: RawDay) -> Self {
        let price = match raw.price.local_price_formatted.as_text() {
            Some(formatted) => parse_price(formatted),
            None => Price::default(),
        };

        Self {
            date: raw.calendar_date,
            available: raw.available,
            min_nights: clamp_u32(raw.min_nights),
            max_nights: clamp_u32(raw.max_nights),
            available_for_checkin: raw.available_for_checkin,
            available_for_checkout: raw.available_for_checkout,
            bookable: raw.bookable.truthy(),
            price,
        }
    }
}

impl From<RawMonth> for CalendarMonth {
    fn from(raw: RawMonth) -> Self {
        Self {
            month: clamp_u32(raw.month),
            year: i32::try_from(raw.year).unwrap_or_default(),
            days: raw.days.into_iter().map(CalendarDay::from).collect(),
        }
    }
}

/// Decodes a `PdpAvailabilityCalendar` response body
///
/// The `pdpAvailabilityCalendar` object is required; an empty month list
/// inside it is a valid, empty calendar.
pub fn parse_calendar(body: &[u8], room_id: u64) -> Result<Calendar, ParseError> {
    let root: RawRoot = decode_api_body(body)?;

    let calendar = root
        .data
        .merlin
        .and_then(|m| m.pdp_availability_calendar)
        .ok_or(ParseError::MissingStructure("merlin.pdpAvailabilityCalendar"))?;

    Ok(Calendar {
        room_id,
        months: calendar
            .calendar_months
            .into_iter()
            .map(CalendarMonth::from)
            .collect(),
    })
}
