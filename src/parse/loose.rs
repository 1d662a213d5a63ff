use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A field the upstream sends as a string, an object or null, depending
/// on the record
///
/// Resolve it into a concrete clean value inside the parser; it never
/// appears in a clean record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Loose {
    #[default]
    Absent,
    Text(String),
    Structured(Value),
}

impl<'de> Deserialize<'de> for Loose {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Self::Absent,
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        })
    }
}

impl Loose {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The value when it arrived as a plain string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text of the field: the string itself, or `key` inside an object
    pub fn text_or_field(&self, key: &str) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => v
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Self::Absent => String::new(),
        }
    }

    /// Truthiness: JSON booleans, `"true"` strings and non-zero numbers
    pub fn truthy(&self) -> bool {
        match self {
            Self::Text(s) => s.eq_ignore_ascii_case("true"),
            Self::Structured(Value::Bool(b)) => *b,
            Self::Structured(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        }
    }

    /// Decodes an object payload, falling back to `T::default()`
    pub fn decode_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match self {
            Self::Structured(v @ Value::Object(_)) => {
                serde_json::from_value(v.clone()).unwrap_or_default()
            }
            _ => T::default(),
        }
    }
}

/// Lenient field deserializers for use with `#[serde(default, deserialize_with = "...")]`
///
/// Each one maps null, missing and mistyped input to the type's zero value
/// instead of failing the whole record.
pub mod de {
    use super::*;

    /// Nested objects; null, a non-object or an undecodable object becomes
    /// `T::default()`
    pub fn lenient_object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(match Value::deserialize(deserializer)? {
            v @ Value::Object(_) => serde_json::from_value(v).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "undecodable nested object; using default");
                T::default()
            }),
            Value::Null => T::default(),
            other => {
                tracing::debug!(found = %kind_of(&other), "expected an object; using default");
                T::default()
            }
        })
    }

    /// Arrays decoded element by element; elements that fail to decode are
    /// dropped and anything other than an array is empty
    pub fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(decoded) => Some(decoded),
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping undecodable array element");
                        None
                    }
                })
                .collect(),
            Value::Null => Vec::new(),
            other => {
                tracing::debug!(found = %kind_of(&other), "expected an array; using empty");
                Vec::new()
            }
        })
    }

    fn kind_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Numbers, numeric strings and null; anything else is 0
    pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64().unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        })
    }

    pub fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        })
    }

    /// Strings as-is, numbers and booleans rendered, everything else empty
    pub fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        })
    }
}
