//! Per-target artifact files
//!
//! Layout under the output directory:
//!
//! ```text
//! <dir>/<room_id>/details.json
//! <dir>/<room_id>/calendar.csv
//! <dir>/<room_id>/reviews.json
//! <dir>/cities/<slug>/listings.json
//! ```

use crate::output::{OutputError, OutputResult};
use crate::parse::{Calendar, ListingDetails, ListingSummary, Review};
use crate::storage::TargetKind;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes artifacts atomically under one root directory
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the artifact for `(kind, key)` lives, whether or not it exists
    ///
    /// `key` is the room id for room datasets and the city name for searches.
    pub fn artifact_path(&self, kind: TargetKind, key: &str) -> PathBuf {
        match kind {
            TargetKind::Details => self.root.join(key).join("details.json"),
            TargetKind::Calendar => self.root.join(key).join("calendar.csv"),
            TargetKind::Reviews => self.root.join(key).join("reviews.json"),
            TargetKind::City => self.root.join("cities").join(slugify(key)).join("listings.json"),
        }
    }

    pub fn write_details(&self, details: &ListingDetails) -> OutputResult<PathBuf> {
        let path = self.artifact_path(TargetKind::Details, &details.room_id.to_string());
        write_json(&path, details)?;
        Ok(path)
    }

    pub fn write_reviews(&self, room_id: u64, reviews: &[Review]) -> OutputResult<PathBuf> {
        let path = self.artifact_path(TargetKind::Reviews, &room_id.to_string());
        write_json(&path, &reviews)?;
        Ok(path)
    }

    pub fn write_city(&self, city: &str, listings: &[ListingSummary]) -> OutputResult<PathBuf> {
        let path = self.artifact_path(TargetKind::City, city);
        write_json(&path, &listings)?;
        Ok(path)
    }

    /// One row per calendar day
    pub fn write_calendar(&self, calendar: &Calendar) -> OutputResult<PathBuf> {
        let path = self.artifact_path(TargetKind::Calendar, &calendar.room_id.to_string());
        write_atomic(&path, &calendar_csv(calendar)?)?;
        Ok(path)
    }
}

#[derive(Serialize)]
struct CalendarRow<'a> {
    date: &'a str,
    available: bool,
    min_nights: u32,
    max_nights: u32,
    available_for_checkin: bool,
    available_for_checkout: bool,
    bookable: bool,
    price_formatted: &'a str,
    price_amount: f64,
    price_currency: &'a str,
}

fn calendar_csv(calendar: &Calendar) -> OutputResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for day in calendar.days() {
        writer.serialize(CalendarRow {
            date: &day.date,
            available: day.available,
            min_nights: day.min_nights,
            max_nights: day.max_nights,
            available_for_checkin: day.available_for_checkin,
            available_for_checkout: day.available_for_checkout,
            bookable: day.bookable,
            price_formatted: &day.price.formatted,
            price_amount: day.price.amount,
            price_currency: &day.price.currency,
        })?;
    }
    writer
        .into_inner()
        .map_err(|e| OutputError::Io(e.into_error()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> OutputResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Writes to a sibling temp file, then renames over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| OutputError::InvalidPath(path.to_path_buf()))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| OutputError::InvalidPath(path.to_path_buf()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = parent.join(tmp_name);

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
    Ok(())
}

/// Lowercase ASCII alphanumerics joined by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}
