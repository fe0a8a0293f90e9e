//! Opportunistic restoration of types for values that arrive as text
//!
//! Configuration contents and query parameters are stored or transported as
//! strings. [`str2type`] turns such a string back into a typed JSON value when
//! it parses as JSON and otherwise leaves it alone. The conversion is lossy by
//! nature: the string `"123"` always comes back as a number.
//!
//! [`ConfigValue`] is the typed form used by the configuration layer. Text that
//! is not JSON is kept as [`ConfigValue::Raw`] instead of being silently
//! converted, so callers can tell the two situations apart.

use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Take a value and, if it is a JSON string, try to parse its content.
///
/// Non-string values are returned unchanged. Strings that are not valid JSON
/// are returned unchanged as well.
///
/// ```
/// use proso_common::str2type;
/// use serde_json::json;
///
/// assert_eq!(str2type(json!("[1, 2, 3]")), json!([1, 2, 3]));
/// assert_eq!(str2type(json!("not json")), json!("not json"));
/// assert_eq!(str2type(json!(42)), json!(42));
/// ```
pub fn str2type(value: Value) -> Value {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(_) => Value::String(text),
        },
        other => other,
    }
}

/// Typed configuration value produced at read time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
    /// Content which is not valid JSON, kept verbatim
    Raw(String),
}

impl ConfigValue {
    /// Parse stored text; falls back to [`ConfigValue::Raw`] on invalid JSON
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => value.into(),
            Err(_) => ConfigValue::Raw(text.to_string()),
        }
    }

    /// True when the content could not be parsed
    pub fn is_raw(&self) -> bool {
        matches!(self, ConfigValue::Raw(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    /// String content of `Text` and `Raw` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) | ConfigValue::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Convert back to JSON; raw text becomes a JSON string
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Number(n) => Value::Number(n.clone()),
            ConfigValue::Text(s) | ConfigValue::Raw(s) => Value::String(s.clone()),
            ConfigValue::List(items) => Value::Array(items.iter().map(ConfigValue::to_json).collect()),
            ConfigValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(b),
            Value::Number(n) => ConfigValue::Number(n),
            Value::String(s) => ConfigValue::Text(s),
            Value::Array(items) => ConfigValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                ConfigValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
