//! Request-scoped configuration overrides
//!
//! Overrides are keyed by `"app_name.dotted.key"` and hold scalar values only.
//! They are collected per request (for example from A/B experiment
//! assignment) and applied on top of the static settings tree.

use crate::conversion::str2type;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Set of scalar overrides for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    values: BTreeMap<String, Value>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `app_name_key` by a scalar value
    ///
    /// String values go through [`str2type`], so `"10"` becomes the number 10.
    pub fn set(&mut self, app_name_key: impl Into<String>, value: Value) -> Result<()> {
        let app_name_key = app_name_key.into();
        match value {
            Value::Null => Err(Error::InvalidInput(format!(
                "The value overriding '{}' can not be null.",
                app_name_key
            ))),
            Value::Array(_) | Value::Object(_) => Err(Error::InvalidInput(format!(
                "The value overriding '{}' has to be scalar.",
                app_name_key
            ))),
            scalar => {
                self.values.insert(app_name_key, str2type(scalar));
                Ok(())
            }
        }
    }

    pub fn get(&self, app_name_key: &str) -> Option<&Value> {
        self.values.get(app_name_key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Apply every override to a value found at `app_name_key`
    ///
    /// `None` means the value is the whole configuration tree.
    pub fn apply(&self, app_name_key: Option<&str>, value: Value) -> Result<Value> {
        let mut value = value;
        for (override_key, override_val) in &self.values {
            value = override_value(app_name_key, value, override_key, override_val.clone())?;
        }
        Ok(value)
    }
}

impl FromIterator<(String, Value)> for Overrides {
    /// Collects scalar entries; non-scalar entries are skipped
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut overrides = Overrides::new();
        for (key, value) in iter {
            if let Err(e) = overrides.set(key, value) {
                warn!("Override dropped: {}", e);
            }
        }
        overrides
    }
}

fn covers(app_name_key: &str, override_key: &str) -> bool {
    override_key == app_name_key
        || override_key
            .strip_prefix(app_name_key)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Override one key inside `value`, which lives at `app_name_key`
///
/// Missing intermediate maps are created. Replacing a whole map by a scalar is
/// refused, as is descending through a scalar.
pub fn override_value(
    app_name_key: Option<&str>,
    value: Value,
    override_key: &str,
    new_value: Value,
) -> Result<Value> {
    if let Some(prefix) = app_name_key {
        if !covers(prefix, override_key) {
            return Ok(value);
        }
    }

    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Ok(if app_name_key == Some(override_key) {
                new_value
            } else {
                other
            });
        }
    };

    let relative_key = match app_name_key {
        Some(prefix) if prefix == override_key => {
            return Err(Error::Config(format!(
                "The map at '{}' can not be overridden by a scalar.",
                prefix
            )));
        }
        Some(prefix) => &override_key[prefix.len() + 1..],
        None => override_key,
    };

    let keys: Vec<&str> = relative_key.split('.').collect();
    let (last, path) = keys
        .split_last()
        .ok_or_else(|| Error::Config("Empty override key.".to_string()))?;

    let mut target: &mut Map<String, Value> = &mut map;
    for k in path {
        let entry = target
            .entry(k.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        target = match entry {
            Value::Object(inner) => inner,
            _ => {
                return Err(Error::Config(format!(
                    "Can not override '{}': '{}' is not a map.",
                    override_key, k
                )));
            }
        };
    }
    target.insert(last.to_string(), new_value);
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_rejects_non_scalars() {
        let mut overrides = Overrides::new();
        assert!(overrides.set("app.key", Value::Null).is_err());
        assert!(overrides.set("app.key", json!([1])).is_err());
        assert!(overrides.set("app.key", json!({"a": 1})).is_err());
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_set_converts_strings() {
        let mut overrides = Overrides::new();
        overrides.set("app.number", json!("10")).unwrap();
        overrides.set("app.text", json!("hello")).unwrap();
        assert_eq!(overrides.get("app.number"), Some(&json!(10)));
        assert_eq!(overrides.get("app.text"), Some(&json!("hello")));
    }

    #[test]
    fn test_override_whole_tree_creates_path() {
        let tree = json!({"app": {"a": {"b": 1}}});
        let result = override_value(None, tree, "app.a.c.d", json!(true)).unwrap();
        assert_eq!(result, json!({"app": {"a": {"b": 1, "c": {"d": true}}}}));
    }

    #[test]
    fn test_override_scalar_at_key() {
        let result = override_value(Some("app.a"), json!(1), "app.a", json!(2)).unwrap();
        assert_eq!(result, json!(2));

        let unrelated = override_value(Some("app.a"), json!(1), "app.ab", json!(2)).unwrap();
        assert_eq!(unrelated, json!(1));
    }

    #[test]
    fn test_override_subtree_relative_to_prefix() {
        let result = override_value(Some("app.a"), json!({"b": 1}), "app.a.b", json!(5)).unwrap();
        assert_eq!(result, json!({"b": 5}));
    }

    #[test]
    fn test_override_map_by_scalar_fails() {
        assert!(override_value(Some("app.a"), json!({"b": 1}), "app.a", json!(5)).is_err());
    }

    #[test]
    fn test_override_through_scalar_fails() {
        assert!(override_value(None, json!({"app": 1}), "app.a", json!(5)).is_err());
    }

    #[test]
    fn test_apply_all() {
        let overrides: Overrides = vec![
            ("app.x".to_string(), json!(1)),
            ("other.y".to_string(), json!("z")),
        ]
        .into_iter()
        .collect();
        let result = overrides.apply(None, json!({"app": {"x": 0}})).unwrap();
        assert_eq!(result, json!({"app": {"x": 1}, "other": {"y": "z"}}));
    }

    #[test]
    fn test_collect_skips_rejected_entries() {
        let overrides: Overrides = vec![
            ("app.null".to_string(), Value::Null),
            ("app.list".to_string(), json!([1, 2])),
            ("app.kept".to_string(), json!("3")),
        ]
        .into_iter()
        .collect();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get("app.kept"), Some(&json!(3)));
    }
}
