//! Listing details from the room page
//!
//! The room page embeds its data in a `data-deferred-state` script as a
//! `niobeClientData` array of `[key, payload]` pairs. The payload's
//! `stayProductDetailPage.sections` holds a metadata object plus a list of
//! sections, each tagged with a `sectionComponentType`.

use crate::parse::de::{
    lenient_bool, lenient_f64, lenient_i64, lenient_object, lenient_seq, lenient_string,
};
use crate::parse::{normalize_text, parse_price, Loose, ParseError, Price};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFERRED_STATE_SELECTOR: &str = "script[id^='data-deferred-state'], script[data-deferred-state]";

// ===== Raw upstream shape =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeferredState {
    #[serde(default, deserialize_with = "lenient_seq")]
    niobe_client_data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawNiobePayload {
    data: RawPayloadData,
}

#[derive(Debug, Deserialize)]
struct RawPayloadData {
    presentation: RawPresentation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPresentation {
    stay_product_detail_page: RawDetailPage,
}

#[derive(Debug, Deserialize)]
struct RawDetailPage {
    sections: RawSections,
}

#[derive(Debug, Deserialize)]
struct RawSections {
    #[serde(default, deserialize_with = "lenient_object")]
    metadata: RawMetadata,
    #[serde(default, deserialize_with = "lenient_seq")]
    sections: Vec<RawSectionEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSectionEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    section_component_type: String,
    #[serde(default)]
    section: Loose,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    language_code: String,
    #[serde(default, deserialize_with = "lenient_object")]
    sharing_config: RawSharingConfig,
    #[serde(default, deserialize_with = "lenient_object")]
    logging_context: RawLoggingContext,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSharingConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    property_type: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    person_capacity: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoggingContext {
    #[serde(default, deserialize_with = "lenient_object")]
    event_data_logging: RawEventData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventData {
    #[serde(default, deserialize_with = "lenient_string")]
    room_type: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    home_tier: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    person_capacity: i64,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_superhost: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    accuracy_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    checkin_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    cleanliness_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    communication_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    location_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    value_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    guest_satisfaction_overall: f64,
    #[serde(default, deserialize_with = "lenient_i64")]
    visible_review_count: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    listing_lat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    listing_lng: f64,
}

// Section payloads, keyed by `sectionComponentType`

#[derive(Debug, Default, Deserialize)]
struct TitleSection {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionSection {
    #[serde(default, deserialize_with = "lenient_object")]
    html_description: HtmlText,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HtmlText {
    #[serde(default, deserialize_with = "lenient_string")]
    html_text: String,
}

#[derive(Debug, Default, Deserialize)]
struct HighlightsSection {
    #[serde(default, deserialize_with = "lenient_seq")]
    highlights: Vec<RawTitled>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTitled {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    subtitle: String,
    #[serde(default, deserialize_with = "lenient_string")]
    icon: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmenitiesSection {
    #[serde(default, deserialize_with = "lenient_seq")]
    see_all_amenities_groups: Vec<RawAmenityGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAmenityGroup {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    amenities: Vec<RawAmenity>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAmenity {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    subtitle: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    available: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    icon: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoliciesSection {
    #[serde(default, deserialize_with = "lenient_string")]
    house_rules_additional: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    house_rules_sections: Vec<RawRuleGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRuleGroup {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    items: Vec<RawTitled>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationSection {
    #[serde(default, deserialize_with = "lenient_f64")]
    lat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    lng: f64,
    #[serde(default, deserialize_with = "lenient_seq")]
    see_all_location_details: Vec<RawLocationDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocationDetail {
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_object")]
    content: HtmlText,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostSection {
    #[serde(default, deserialize_with = "lenient_object")]
    card_data: RawHostCard,
    #[serde(default, deserialize_with = "lenient_string")]
    about: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    cohosts: Vec<RawHostCard>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHostCard {
    #[serde(default, deserialize_with = "lenient_string")]
    user_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    member_since: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_superhost: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotoSection {
    #[serde(default, deserialize_with = "lenient_seq")]
    media_items: Vec<RawMediaItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMediaItem {
    #[serde(default, deserialize_with = "lenient_string")]
    base_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    accessibility_label: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookItSection {
    #[serde(default, deserialize_with = "lenient_object")]
    structured_display_price: RawDisplayPrice,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDisplayPrice {
    #[serde(default, deserialize_with = "lenient_object")]
    primary_line: RawPriceLine,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPriceLine {
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) discounted_price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) qualifier: String,
}

impl RawPriceLine {
    /// The price a guest would pay: discounted when there is a discount
    pub(crate) fn effective(&self) -> &str {
        if self.discounted_price.is_empty() {
            &self.price
        } else {
            &self.discounted_price
        }
    }
}

// ===== Clean records =====

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingDetails {
    pub room_id: u64,
    pub url: String,
    pub title: String,
    pub room_type: String,
    pub language: String,
    pub home_tier: u32,
    pub person_capacity: u32,
    pub is_super_host: bool,
    pub price: Price,
    pub price_qualifier: String,
    pub rating: Rating,
    pub coordinates: Coordinates,
    pub host: Host,
    pub co_hosts: Vec<CoHost>,
    pub description: String,
    pub highlights: Vec<Highlight>,
    pub amenities: Vec<AmenityGroup>,
    pub house_rules: HouseRules,
    pub location_details: Vec<LocationDetail>,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rating {
    pub accuracy: f64,
    pub checkin: f64,
    pub cleanliness: f64,
    pub communication: f64,
    pub location: f64,
    pub value: f64,
    pub guest_satisfaction: f64,
    pub review_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Host {
    pub id: String,
    pub name: String,
    pub joined_on: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoHost {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Highlight {
    pub title: String,
    pub subtitle: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AmenityGroup {
    pub title: String,
    pub values: Vec<Amenity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Amenity {
    pub title: String,
    pub subtitle: String,
    pub available: bool,
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HouseRules {
    pub additional: String,
    pub general: Vec<HouseRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HouseRule {
    pub title: String,
    pub values: Vec<HouseRuleValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HouseRuleValue {
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationDetail {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Image {
    pub title: String,
    pub url: String,
}

// ===== Extraction =====

fn deferred_state_payloads(html: &str) -> Result<Vec<Value>, ParseError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(DEFERRED_STATE_SELECTOR).map_err(|e| ParseError::Selector(e.to_string()))?;

    let mut scripts = document.select(&selector).peekable();
    if scripts.peek().is_none() {
        return Err(ParseError::MissingStructure("data-deferred-state script"));
    }

    let mut payloads = Vec::new();
    for script in scripts {
        let text = script.text().collect::<String>();
        match serde_json::from_str::<RawDeferredState>(&text) {
            Ok(state) => payloads.extend(
                state
                    .niobe_client_data
                    .into_iter()
                    .filter_map(|entry| entry.get(1).cloned()),
            ),
            Err(e) => tracing::debug!(error = %e, "skipping undecodable deferred-state script"),
        }
    }
    Ok(payloads)
}

/// Decodes one section payload; a payload of the wrong shape is logged and
/// treated as absent
fn decode_section<T: DeserializeOwned>(sections: &[RawSectionEntry], component: &str) -> Option<T> {
    let entry = sections
        .iter()
        .find(|s| s.section_component_type == component)?;

    let Loose::Structured(value) = &entry.section else {
        return None;
    };
    match serde_json::from_value(value.clone()) {
        Ok(section) => Some(section),
        Err(e) => {
            tracing::warn!(section = component, error = %e, "skipping undecodable section");
            None
        }
    }
}

/// Reduces an HTML fragment to its text, keeping line breaks
fn html_to_text(fragment: &str) -> String {
    let with_breaks = fragment
        .replace("<br />", "\n")
        .replace("<br/>", "\n")
        .replace("<br>", "\n");
    let parsed = Html::parse_fragment(&with_breaks);
    let text: String = parsed.root_element().text().collect();

    text.lines()
        .map(|line| normalize_text(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Extracts listing details from a room page
///
/// The deferred-state script and its sections container are required; a
/// page without them is a blocked or redesigned page and fails the job.
/// Individual sections are optional.
pub fn parse_details(html: &str, room_id: u64, url: &str) -> Result<ListingDetails, ParseError> {
    let page = deferred_state_payloads(html)?
        .into_iter()
        .find_map(|payload| serde_json::from_value::<RawNiobePayload>(payload).ok())
        .ok_or(ParseError::MissingStructure(
            "niobeClientData stayProductDetailPage.sections",
        ))?;

    let RawSections { metadata, sections } = page.data.presentation.stay_product_detail_page.sections;
    let events = metadata.logging_context.event_data_logging;
    let sharing = metadata.sharing_config;

    let title = decode_section::<TitleSection>(&sections, "TITLE_DEFAULT")
        .map(|s| s.title)
        .filter(|t| !t.is_empty())
        .unwrap_or(sharing.title);

    let room_type = if events.room_type.is_empty() {
        sharing.property_type
    } else {
        events.room_type
    };

    let person_capacity = if events.person_capacity > 0 {
        events.person_capacity
    } else {
        sharing.person_capacity
    };

    let (price, price_qualifier) = decode_section::<BookItSection>(&sections, "BOOK_IT_SIDEBAR")
        .map(|s| {
            let line = s.structured_display_price.primary_line;
            (parse_price(line.effective()), line.qualifier)
        })
        .unwrap_or_default();

    let location = decode_section::<LocationSection>(&sections, "LOCATION_PDP").unwrap_or_default();
    let coordinates = Coordinates {
        latitude: if location.lat != 0.0 { location.lat } else { events.listing_lat },
        longitude: if location.lng != 0.0 { location.lng } else { events.listing_lng },
    };

    let host_section = decode_section::<HostSection>(&sections, "MEET_YOUR_HOST").unwrap_or_default();
    let host = Host {
        id: host_section.card_data.user_id,
        name: host_section.card_data.name,
        joined_on: host_section.card_data.member_since,
        description: normalize_text(&host_section.about).into_owned(),
    };
    let co_hosts = host_section
        .cohosts
        .into_iter()
        .map(|c| CoHost {
            id: c.user_id,
            name: c.name,
        })
        .collect();

    let description = decode_section::<DescriptionSection>(&sections, "DESCRIPTION_DEFAULT")
        .map(|s| html_to_text(&s.html_description.html_text))
        .unwrap_or_default();

    let highlights = decode_section::<HighlightsSection>(&sections, "HIGHLIGHTS_DEFAULT")
        .unwrap_or_default()
        .highlights
        .into_iter()
        .map(|h| Highlight {
            title: h.title,
            subtitle: h.subtitle,
            icon: h.icon,
        })
        .collect();

    let amenities = decode_section::<AmenitiesSection>(&sections, "AMENITIES_DEFAULT")
        .unwrap_or_default()
        .see_all_amenities_groups
        .into_iter()
        .map(|g| AmenityGroup {
            title: g.title,
            values: g
                .amenities
                .into_iter()
                .map(|a| Amenity {
                    title: a.title,
                    subtitle: a.subtitle,
                    available: a.available,
                    icon: a.icon,
                })
                .collect(),
        })
        .collect();

    let policies = decode_section::<PoliciesSection>(&sections, "POLICIES_DEFAULT").unwrap_or_default();
    let house_rules = HouseRules {
        additional: policies.house_rules_additional,
        general: policies
            .house_rules_sections
            .into_iter()
            .map(|g| HouseRule {
                title: g.title,
                values: g
                    .items
                    .into_iter()
                    .map(|i| HouseRuleValue {
                        title: i.title,
                        icon: i.icon,
                    })
                    .collect(),
            })
            .collect(),
    };

    let location_details = location
        .see_all_location_details
        .into_iter()
        .map(|d| LocationDetail {
            title: d.title,
            content: html_to_text(&d.content.html_text),
        })
        .collect();

    let images = decode_section::<PhotoSection>(&sections, "PHOTO_TOUR_SCROLLABLE")
        .unwrap_or_default()
        .media_items
        .into_iter()
        .filter(|m| !m.base_url.is_empty())
        .map(|m| Image {
            title: m.accessibility_label,
            url: m.base_url,
        })
        .collect();

    Ok(ListingDetails {
        room_id,
        url: url.to_string(),
        title,
        room_type,
        language: metadata.language_code,
        home_tier: to_u32(events.home_tier),
        person_capacity: to_u32(person_capacity),
        is_super_host: events.is_superhost || host_section.card_data.is_superhost,
        price,
        price_qualifier,
        rating: Rating {
            accuracy: events.accuracy_rating,
            checkin: events.checkin_rating,
            cleanliness: events.cleanliness_rating,
            communication: events.communication_rating,
            location: events.location_rating,
            value: events.value_rating,
            guest_satisfaction: events.guest_satisfaction_overall,
            review_count: u64::try_from(events.visible_review_count).unwrap_or_default(),
        },
        coordinates,
        host,
        co_hosts,
        description,
        highlights,
        amenities,
        house_rules,
        location_details,
        images,
    })
}
