//! Review page decoding

use crate::parse::de::{
    lenient_bool, lenient_f64, lenient_i64, lenient_object, lenient_seq, lenient_string,
};
use crate::parse::{decode_api_body, parse_timestamp_or_default, Loose, ParseError};
use chrono::{DateTime, Utc};
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
    stay_product_detail_page: Option<RawDetailPage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetailPage {
    #[serde(default)]
    reviews: Option<RawReviews>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReviews {
    #[serde(default, deserialize_with = "lenient_object")]
    metadata: RawMetadata,
    #[serde(default, deserialize_with = "lenient_object")]
    pagination_info: RawPaginationInfo,
    #[serde(default, deserialize_with = "lenient_seq")]
    reviews: Vec<RawReview>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default, deserialize_with = "lenient_i64")]
    reviews_count: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    rating_value: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaginationInfo {
    #[serde(default)]
    has_next_page: Loose,
    #[serde(default, deserialize_with = "lenient_string")]
    next_page_cursor: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReview {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    comments: String,
    #[serde(default, deserialize_with = "lenient_string")]
    language: String,
    #[serde(default, deserialize_with = "lenient_string")]
    created_at: String,
    #[serde(default, deserialize_with = "lenient_string")]
    localized_date: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    rating: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    review_highlight: String,
    #[serde(default, deserialize_with = "lenient_object")]
    reviewer: RawUser,
    #[serde(default, deserialize_with = "lenient_object")]
    reviewee: RawUser,
    #[serde(default, deserialize_with = "lenient_object")]
    localized_review: RawLocalizedReview,
    #[serde(default)]
    response: Loose,
    #[serde(default)]
    collection_tag: Loose,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    first_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    host_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    picture_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    profile_path: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_superhost: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocalizedReview {
    #[serde(default, deserialize_with = "lenient_string")]
    comments: String,
    #[serde(default)]
    response: Loose,
}

// ===== Clean records =====

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewUser {
    pub id: String,
    pub first_name: String,
    pub full_name: String,
    pub is_superhost: bool,
    pub profile_picture_url: String,
    pub profile_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Review {
    pub id: String,
    pub comments: String,
    pub translated_comments: String,
    pub language: String,
    /// Zero timestamp when `created_at_raw` matched no known format
    pub created_at: DateTime<Utc>,
    pub created_at_raw: String,
    pub localized_date: String,
    pub rating: u8,
    pub reviewer: ReviewUser,
    pub host: ReviewUser,
    pub highlight: String,
    pub host_response: String,
    pub collection_tag: String,
}

/// One page of reviews plus the page-level metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewsPage {
    pub reviews: Vec<Review>,
    pub total_count: u64,
    pub average_rating: f64,
    /// `None` when the upstream did not say
    pub has_more: Option<bool>,
    pub next_cursor: Option<String>,
}

impl From<RawUser> for ReviewUser {
    fn from(raw: RawUser) -> Self {
        Self {
            id: raw.id,
            first_name: raw.first_name,
            full_name: raw.host_name,
            is_superhost: raw.is_superhost,
            profile_picture_url: raw.picture_url,
            profile_path: raw.profile_path,
        }
    }
}

impl From<RawReview> for Review {
    fn from(raw: RawReview) -> Self {
        let created_at = parse_timestamp_or_default(&raw.created_at, "review.createdAt");

        let mut host_response = raw.response.text_or_field("comments");
        if host_response.is_empty() {
            host_response = raw.localized_review.response.text_or_field("comments");
        }

        Self {
            id: raw.id,
            comments: raw.comments,
            translated_comments: raw.localized_review.comments,
            language: raw.language,
            created_at,
            created_at_raw: raw.created_at,
            localized_date: raw.localized_date,
            rating: u8::try_from(raw.rating.clamp(0, 5)).unwrap_or_default(),
            reviewer: raw.reviewer.into(),
            host: raw.reviewee.into(),
            highlight: raw.review_highlight,
            host_response,
            collection_tag: raw.collection_tag.text_or_field("tag"),
        }
    }
}

/// Decodes a `StaysPdpReviewsQuery` response body
pub fn parse_reviews_page(body: &[u8]) -> Result<ReviewsPage, ParseError> {
    let root: RawRoot = decode_api_body(body)?;

    let raw = root
        .data
        .presentation
        .and_then(|p| p.stay_product_detail_page)
        .and_then(|p| p.reviews)
        .ok_or(ParseError::MissingStructure(
            "presentation.stayProductDetailPage.reviews",
        ))?;

    let next_cursor = Some(raw.pagination_info.next_page_cursor).filter(|c| !c.is_empty());

    Ok(ReviewsPage {
        reviews: raw.reviews.into_iter().map(Review::from).collect(),
        total_count: u64::try_from(raw.metadata.reviews_count).unwrap_or_default(),
        average_rating: raw.metadata.rating_value,
        has_more: (!raw.pagination_info.has_next_page.is_absent())
            .then(|| raw.pagination_info.has_next_page.truthy()),
        next_cursor,
    })
}
