//! Shared fixtures for the integration tests
//!
//! Every test runs against a wiremock server standing in for the upstream
//! site, with fast backoff so retry scenarios finish in milliseconds.

use serde_json::{json, Value};
use stay_harvest::config::{parse_config, Config};
use std::path::Path;
use wiremock::{Match, Request};

pub const CALENDAR_PATH: &str = "/api/v3/PdpAvailabilityCalendar";
pub const REVIEWS_PATH: &str = "/api/v3/StaysPdpReviewsQuery";
pub const SEARCH_PATH: &str = "/api/v3/StaysSearch";

pub const API_KEY: &str = "d306zoyjsyarp7ifhu67rjxn52tv0t20";

/// Configuration pointing at `base_url`, writing everything under `dir`
///
/// `client_extra` is inserted verbatim into the `[client]` table.
pub fn test_config(base_url: &str, dir: &Path, client_extra: &str) -> Config {
    let hash = "a".repeat(64);
    let toml = format!(
        r#"
[client]
base-url = "{base_url}"
{client_extra}

[retry]
max-attempts = 5
backoff-base-ms = 20
jitter-ms = 10
timeout-secs = 5

[pagination]
max-pages = 3
review-page-size = 2
search-page-size = 2
calendar-months = 1

[scheduler]
room-concurrency = 3
city-concurrency = 2
min-delay-ms = 0
max-delay-ms = 0

[endpoints.calendar]
path = "{CALENDAR_PATH}"
hash = "{hash}"

[endpoints.reviews]
path = "{REVIEWS_PATH}"
hash = "{hash}"

[endpoints.search]
path = "{SEARCH_PATH}"
hash = "{hash}"

[output]
directory = "{dir}/artifacts"
index-path = "{dir}/index.db"
"#,
        dir = dir.display(),
    );

    parse_config(&toml).expect("test config should be valid")
}

/// A room page carrying an API key and a minimal details payload
pub fn room_page(room_id: u64) -> String {
    let state = json!({
        "niobeClientData": [[
            format!("StaysPdpSections:{room_id}"),
            {
                "data": {
                    "presentation": {
                        "stayProductDetailPage": {
                            "sections": {
                                "metadata": {
                                    "sharingConfig": { "title": "Fallback title", "personCapacity": 2 }
                                },
                                "sections": [
                                    {
                                        "sectionComponentType": "TITLE_DEFAULT",
                                        "section": { "title": format!("Room {room_id}") }
                                    }
                                ]
                            }
                        }
                    }
                }
            }
        ]]
    });

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Room {room_id}</title></head>
<body>
<script id="data-injector-instances" type="application/json">{{"api_config":{{"key":"{API_KEY}","baseUrl":"/api"}}}}</script>
<script id="data-deferred-state-0" type="application/json">{state}</script>
</body>
</html>"#
    )
}

pub fn calendar_body() -> Value {
    json!({
        "data": {
            "merlin": {
                "pdpAvailabilityCalendar": {
                    "calendarMonths": [{
                        "month": 1,
                        "year": 2027,
                        "days": [
                            {
                                "calendarDate": "2027-01-01",
                                "available": true,
                                "minNights": 2,
                                "maxNights": 30,
                                "availableForCheckin": true,
                                "availableForCheckout": false,
                                "bookable": true,
                                "price": { "localPriceFormatted": "$120" }
                            },
                            {
                                "calendarDate": "2027-01-02",
                                "available": false,
                                "minNights": "2",
                                "maxNights": 30,
                                "availableForCheckin": false,
                                "availableForCheckout": true,
                                "bookable": null,
                                "price": { "localPriceFormatted": null }
                            }
                        ]
                    }]
                }
            }
        }
    })
}

/// A full review page that always claims another page follows
pub fn reviews_body(first_id: u64, count: u64) -> Value {
    let reviews: Vec<Value> = (first_id..first_id + count)
        .map(|id| {
            json!({
                "id": id.to_string(),
                "comments": format!("Review {id}"),
                "language": "en",
                "createdAt": "2024-05-01T10:00:00Z",
                "rating": 5,
                "reviewer": { "id": "9", "firstName": "Ana" }
            })
        })
        .collect();

    json!({
        "data": {
            "presentation": {
                "stayProductDetailPage": {
                    "reviews": {
                        "metadata": { "reviewsCount": 1000, "ratingValue": 4.9 },
                        "paginationInfo": { "hasNextPage": true },
                        "reviews": reviews
                    }
                }
            }
        }
    })
}

pub fn search_body(room_ids: &[u64], next_cursor: Option<&str>) -> Value {
    let results: Vec<Value> = room_ids
        .iter()
        .map(|id| {
            json!({
                "listing": {
                    "id": id.to_string(),
                    "name": format!("Listing {id}"),
                    "city": "Lisbon",
                    "avgRatingLocalized": "4.8 (12)"
                },
                "pricingQuote": null
            })
        })
        .collect();

    json!({
        "data": {
            "presentation": {
                "staysSearch": {
                    "results": {
                        "searchResults": results,
                        "paginationInfo": { "nextPageCursor": next_cursor }
                    }
                }
            }
        }
    })
}

/// Matches API calls whose `variables` parameter contains `needle`
pub struct VariablesContain(pub String);

impl VariablesContain {
    pub fn listing(room_id: u64) -> Self {
        Self(format!("\"listingId\":\"{room_id}\""))
    }

    pub fn cursor(cursor: &str) -> Self {
        Self(format!("\"cursor\":\"{cursor}\""))
    }
}

impl Match for VariablesContain {
    fn matches(&self, request: &Request) -> bool {
        request
            .url
            .query_pairs()
            .any(|(name, value)| name == "variables" && value.contains(&self.0))
    }
}

/// Number of requests the server saw for `path`
pub async fn requests_to(server: &wiremock::MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == path)
        .count()
}
