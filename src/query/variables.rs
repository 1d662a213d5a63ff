use crate::query::ids::encode_typed_id;
use serde::Serialize;

/// Type prefix of listing ids in the global id space
const LISTING_TYPE: &str = "StayListing";

const SEARCH_TREATMENTS: &[&str] = &[
    "feed_map_decouple_m11_treatment",
    "stays_search_rehydration_treatment_desktop",
    "stays_search_rehydration_treatment_moweb",
    "selective_query_feed_map_homepage_desktop_treatment",
    "selective_query_feed_map_homepage_moweb_treatment",
];

/// One availability calendar window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParams {
    pub listing_id: u64,
    pub month: u32,
    pub year: i32,
    /// Number of months starting at `month`/`year`
    pub count: u32,
}

/// One page of reviews, most recent first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewsParams {
    pub listing_id: u64,
    pub offset: u32,
    pub limit: u32,
}

/// Geographic bounds of a map search
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub ne_lat: f64,
    pub ne_lng: f64,
    pub sw_lat: f64,
    pub sw_lng: f64,
}

/// One page of a city search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub bbox: Option<BoundingBox>,
    pub zoom: u32,
    pub items_per_page: u32,
    /// Opaque upstream cursor; `None` requests the first page
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct CalendarVariables {
    request: CalendarRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CalendarRequest {
    count: u32,
    listing_id: String,
    month: u32,
    year: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReviewsVariables {
    id: String,
    pdp_reviews_request: PdpReviewsRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PdpReviewsRequest {
    field_selector: &'static str,
    for_preview: bool,
    limit: u32,
    // The upstream expects the offset as a string.
    offset: String,
    sorting_preference: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchVariables {
    stays_search_request: StaysSearchRequest,
    is_lean_treatment: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StaysSearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
    requested_page_type: &'static str,
    metadata_only: bool,
    search_type: &'static str,
    treatment_flags: &'static [&'static str],
    raw_params: Vec<RawParam>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawParam {
    filter_name: &'static str,
    filter_values: Vec<String>,
}

impl RawParam {
    fn new(filter_name: &'static str, value: impl ToString) -> Self {
        Self {
            filter_name,
            filter_values: vec![value.to_string()],
        }
    }
}

impl CalendarParams {
    pub(crate) fn variables(&self) -> CalendarVariables {
        CalendarVariables {
            request: CalendarRequest {
                count: self.count,
                listing_id: self.listing_id.to_string(),
                month: self.month,
                year: self.year,
            },
        }
    }
}

impl ReviewsParams {
    pub(crate) fn variables(&self) -> ReviewsVariables {
        ReviewsVariables {
            id: encode_typed_id(LISTING_TYPE, self.listing_id),
            pdp_reviews_request: PdpReviewsRequest {
                field_selector: "for_p3_translation_only",
                for_preview: false,
                limit: self.limit,
                offset: self.offset.to_string(),
                sorting_preference: "MOST_RECENT",
            },
        }
    }
}

impl SearchParams {
    pub(crate) fn variables(&self, currency: &str) -> SearchVariables {
        let mut raw_params = vec![
            RawParam::new("cdnCacheSafe", "false"),
            RawParam::new("channel", "EXPLORE"),
            RawParam::new("currency", currency),
            RawParam::new("itemsPerGrid", self.items_per_page),
            RawParam::new("query", &self.query),
            RawParam::new("refinementPaths", "/homes"),
            RawParam::new("screenSize", "large"),
            RawParam::new("tabId", "home_tab"),
            RawParam::new("version", "1.8.3"),
            RawParam::new("zoomLevel", self.zoom),
        ];

        if let Some(bbox) = &self.bbox {
            raw_params.extend([
                RawParam::new("neLat", bbox.ne_lat),
                RawParam::new("neLng", bbox.ne_lng),
                RawParam::new("swLat", bbox.sw_lat),
                RawParam::new("swLng", bbox.sw_lng),
                RawParam::new("searchByMap", "true"),
            ]);
        }

        SearchVariables {
            stays_search_request: StaysSearchRequest {
                cursor: self.cursor.clone(),
                requested_page_type: "STAYS_SEARCH",
                metadata_only: false,
                search_type: if self.bbox.is_some() {
                    "user_map_move"
                } else {
                    "filter_change"
                },
                treatment_flags: SEARCH_TREATMENTS,
                raw_params,
            },
            is_lean_treatment: false,
        }
    }
}
