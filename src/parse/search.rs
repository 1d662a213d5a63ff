//! City search result decoding

use crate::parse::de::{lenient_f64, lenient_object, lenient_seq, lenient_string};
use crate::parse::details::{Coordinates, RawPriceLine};
use crate::parse::{decode_api_body, parse_price, ParseError, Price};
use serde::{Deserialize, Serialize};

// ===== Raw upstream shape =====

#[derive(Debug, Deserialize)]
struct RawRoot {
    data: RawData,
}

#[derive(Debug, Default, Deserialize)]
struct RawData {
    #[serde(default)]
    presentation: Option<RawPresentation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPresentation {
    #[serde(default)]
    stays_search: Option<RawStaysSearch>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStaysSearch {
    #[serde(default)]
    results: Option<RawResults>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResults {
    #[serde(default, deserialize_with = "lenient_seq")]
    search_results: Vec<RawSearchResult>,
    #[serde(default, deserialize_with = "lenient_object")]
    pagination_info: RawPaginationInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaginationInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    next_page_cursor: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearchResult {
    #[serde(default, deserialize_with = "lenient_object")]
    listing: RawListing,
    #[serde(default, deserialize_with = "lenient_object")]
    pricing_quote: RawPricingQuote,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListing {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    room_type_category: String,
    #[serde(default, deserialize_with = "lenient_string")]
    city: String,
    #[serde(default, deserialize_with = "lenient_string")]
    avg_rating_localized: String,
    #[serde(default, deserialize_with = "lenient_object")]
    coordinate: RawCoordinate,
    #[serde(default, deserialize_with = "lenient_seq")]
    contextual_pictures: Vec<RawPicture>,
    #[serde(default, deserialize_with = "lenient_seq")]
    formatted_badges: Vec<RawBadge>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCoordinate {
    #[serde(default, deserialize_with = "lenient_f64")]
    latitude: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawPicture {
    #[serde(default, deserialize_with = "lenient_string")]
    picture: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBadge {
    #[serde(default, deserialize_with = "lenient_object")]
    logging_context: RawBadgeContext,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBadgeContext {
    #[serde(default, deserialize_with = "lenient_string")]
    badge_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPricingQuote {
    #[serde(default, deserialize_with = "lenient_object")]
    structured_stay_display_price: RawStayDisplayPrice,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStayDisplayPrice {
    #[serde(default, deserialize_with = "lenient_object")]
    primary_line: RawPriceLine,
}

// ===== Clean records =====

/// One search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingSummary {
    pub room_id: u64,
    pub name: String,
    pub title: String,
    pub room_type: String,
    pub city: String,
    pub rating: f64,
    pub review_count: u64,
    pub coordinates: Coordinates,
    pub badges: Vec<String>,
    pub images: Vec<String>,
    pub price: Price,
    pub price_qualifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    pub listings: Vec<ListingSummary>,
    pub next_cursor: Option<String>,
}

impl SearchPage {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Splits `"4.85 (132)"` into rating and count; `"New"` yields zeros
fn parse_localized_rating(text: &str) -> (f64, u64) {
    let mut parts = text.split_whitespace();
    let rating = parts
        .next()
        .and_then(|r| r.replace(',', ".").parse().ok())
        .unwrap_or_default();
    let count = parts
        .next()
        .map(|c| c.trim_matches(|ch| ch == '(' || ch == ')'))
        .and_then(|c| c.parse().ok())
        .unwrap_or_default();
    (rating, count)
}

impl From<RawSearchResult> for ListingSummary {
    fn from(raw: RawSearchResult) -> Self {
        let listing = raw.listing;
        let line = raw.pricing_quote.structured_stay_display_price.primary_line;
        let (rating, review_count) = parse_localized_rating(&listing.avg_rating_localized);

        Self {
            room_id: listing.id.trim().parse().unwrap_or_default(),
            name: listing.name,
            title: listing.title,
            room_type: listing.room_type_category,
            city: listing.city,
            rating,
            review_count,
            coordinates: Coordinates {
                latitude: listing.coordinate.latitude,
                longitude: listing.coordinate.longitude,
            },
            badges: listing
                .formatted_badges
                .into_iter()
                .map(|b| b.logging_context.badge_type)
                .filter(|b| !b.is_empty())
                .collect(),
            images: listing
                .contextual_pictures
                .into_iter()
                .map(|p| p.picture)
                .filter(|p| !p.is_empty())
                .collect(),
            price: parse_price(line.effective()),
            price_qualifier: line.qualifier,
        }
    }
}

/// Decodes a `StaysSearch` response body
///
/// Hits without a usable numeric id are dropped: they cannot be fetched
/// later and would collide on de-duplication.
pub fn parse_search_page(body: &[u8]) -> Result<SearchPage, ParseError> {
    let root: RawRoot = decode_api_body(body)?;

    let results = root
        .data
        .presentation
        .and_then(|p| p.stays_search)
        .and_then(|s| s.results)
        .ok_or(ParseError::MissingStructure("presentation.staysSearch.results"))?;

    let listings = results
        .search_results
        .into_iter()
        .map(ListingSummary::from)
        .filter(|l| {
            if l.room_id == 0 {
                tracing::debug!(name = %l.name, "dropping search hit without room id");
            }
            l.room_id != 0
        })
        .collect();

    Ok(SearchPage {
        listings,
        next_cursor: Some(results.pagination_info.next_page_cursor).filter(|c| !c.is_empty()),
    })
}
