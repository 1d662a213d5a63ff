use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

/// Encodes a typed global id: `base64("<TypePrefix>:<id>")`
pub fn encode_typed_id(type_prefix: &str, id: u64) -> String {
    STANDARD.encode(format!("{}:{}", type_prefix, id))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct SearchCursor {
    section_offset: u32,
    items_offset: u32,
    version: u32,
}

/// Encodes the search pagination cursor for an item offset
pub fn encode_search_cursor(items_offset: u32) -> String {
    let cursor = SearchCursor {
        section_offset: 0,
        items_offset,
        version: 1,
    };
    // Serializing three integers cannot fail.
    let json = serde_json::to_string(&cursor).unwrap_or_default();
    STANDARD.encode(json)
}

/// Recovers the item offset from a search cursor, if it is one of ours
pub fn decode_search_cursor(cursor: &str) -> Option<u32> {
    let bytes = STANDARD.decode(cursor).ok()?;
    let parsed: SearchCursor = serde_json::from_slice(&bytes).ok()?;
    Some(parsed.items_offset)
}

/// Extracts the numeric listing id from a room URL
pub fn room_id_from_url(room_url: &str) -> Option<u64> {
    let url = Url::parse(room_url).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "rooms")?;
    segments.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_typed_id() {
        assert_eq!(encode_typed_id("StayListing", 290701), "U3RheUxpc3Rpbmc6MjkwNzAx");
        let decoded = STANDARD.decode(encode_typed_id("StayListing", 7)).unwrap();
        assert_eq!(decoded, b"StayListing:7");
    }

    #[test]
    fn test_search_cursor() {
        let cursor = encode_search_cursor(80);
        let json = STANDARD.decode(&cursor).unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"section_offset":0,"items_offset":80,"version":1}"#
        );
        assert_eq!(decode_search_cursor(&cursor), Some(80));
        assert_eq!(decode_search_cursor("not base64!"), None);
    }

    #[test]
    fn test_room_id_from_url() {
        assert_eq!(room_id_from_url("https://www.airbnb.com/rooms/290701"), Some(290701));
        assert_eq!(
            room_id_from_url("https://www.airbnb.com/rooms/290701?adults=2&check_in=2025-01-01"),
            Some(290701)
        );
        assert_eq!(room_id_from_url("https://www.airbnb.com/rooms/plus/55"), None);
        assert_eq!(room_id_from_url("https://www.airbnb.com/s/Marrakesh"), None);
        assert_eq!(room_id_from_url("not a url"), None);
    }
}
