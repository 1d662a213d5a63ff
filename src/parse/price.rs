use serde::Serialize;

/// A displayed price split into its parts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Price {
    /// The string as the upstream displayed it
    pub formatted: String,
    pub amount: f64,
    pub currency: String,
}

/// Splits a display price such as `"$1,234.56"` into amount and symbol
///
/// Only the first whitespace-delimited token is read. Inside it, digits and
/// `.` form the amount, `,` is dropped as a thousands separator, and the
/// first remaining character is taken as the currency symbol.
///
/// This is a heuristic, not currency parsing. Known limitations:
/// - multi-character indicators keep only their first character
///   (`"US$12"` yields currency `"U"`; `"CHF 12"` yields amount 0)
/// - decimal commas are read as thousands separators (`"12,50€"` is 1250)
/// - a symbol in a later token is not seen (`"12 €"` has no currency)
pub fn parse_price(formatted: &str) -> Price {
    let token = formatted.split_whitespace().next().unwrap_or_default();

    let mut number = String::with_capacity(token.len());
    let mut currency = None;

    for ch in token.chars() {
        match ch {
            '0'..='9' | '.' => number.push(ch),
            ',' => {}
            other => {
                if currency.is_none() {
                    currency = Some(other);
                }
            }
        }
    }

    Price {
        formatted: formatted.to_string(),
        amount: number.parse().unwrap_or_default(),
        currency: currency.map(String::from).unwrap_or_default(),
    }
}
