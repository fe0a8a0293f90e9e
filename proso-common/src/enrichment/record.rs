//! Intermediate representation of serialized domain objects
//!
//! A domain object is serialized once into [`EnrichedObject::fields`].
//! Enrichers never touch those fields; they write computed values into the
//! `extra` side-mapping, which is merged over the base fields only when the
//! final JSON is produced.

use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// One serialized domain object plus the fields added by enrichers
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedObject {
    object_type: String,
    id: i64,
    fields: Map<String, Value>,
    extra: Map<String, Value>,
}

impl EnrichedObject {
    pub fn new(object_type: impl Into<String>, id: i64, fields: Map<String, Value>) -> Self {
        Self {
            object_type: object_type.into(),
            id,
            fields,
            extra: Map::new(),
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Base fields as produced by the domain object
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Fields added by enrichers so far
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Field value as it will appear in the output (extra wins)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).or_else(|| self.fields.get(key))
    }

    /// Set (or overwrite) a computed field
    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    /// Computed map field, created on first use
    ///
    /// When the base fields already hold a map under `key` it seeds the new
    /// entry, so the base content survives the merge.
    pub fn extra_object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        if !matches!(self.extra.get(key), Some(Value::Object(_))) {
            let seed = match self.fields.get(key) {
                Some(Value::Object(base)) => base.clone(),
                _ => Map::new(),
            };
            self.extra.insert(key.to_string(), Value::Object(seed));
        }
        match self.extra.get_mut(key) {
            Some(Value::Object(map)) => map,
            _ => unreachable!("entry inserted as a map above"),
        }
    }

    /// Final JSON: base fields, identity, then extra fields on top
    pub fn into_json(self) -> Value {
        let mut out = self.fields;
        out.insert("object_type".to_string(), Value::String(self.object_type));
        out.insert("id".to_string(), Value::from(self.id));
        for (key, value) in self.extra {
            out.insert(key, value);
        }
        Value::Object(out)
    }
}

/// Domain object with named lists of nested records
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub object: EnrichedObject,
    pub children: Vec<(String, Vec<Record>)>,
}

impl Record {
    pub fn new(object: EnrichedObject) -> Self {
        Self {
            object,
            children: Vec::new(),
        }
    }

    /// Build from a JSON object holding the base fields
    pub fn from_json(object_type: &str, id: i64, fields: Value) -> Result<Self> {
        match fields {
            Value::Object(map) => Ok(Self::new(EnrichedObject::new(object_type, id, map))),
            other => Err(Error::Internal(format!(
                "{} {} did not serialize to an object: {}",
                object_type, id, other
            ))),
        }
    }

    /// Build from any serializable value
    pub fn from_serialize<T: Serialize>(object_type: &str, id: i64, value: &T) -> Result<Self> {
        Self::from_json(object_type, id, serde_json::to_value(value)?)
    }

    /// Attach nested records under `field`
    pub fn with_children(mut self, field: impl Into<String>, children: Vec<Record>) -> Self {
        self.children.push((field.into(), children));
        self
    }

    pub fn into_json(self) -> Value {
        let mut json = self.object.into_json();
        if let Value::Object(map) = &mut json {
            for (field, children) in self.children {
                let items = children.into_iter().map(Record::into_json).collect();
                map.insert(field, Value::Array(items));
            }
        }
        json
    }
}

/// Conversion of a domain object into its record
pub trait ToRecord {
    /// `nested` objects carry foreign keys instead of embedded parents
    fn to_record(&self, nested: bool) -> Result<Record>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(fields: Value) -> EnrichedObject {
        match fields {
            Value::Object(map) => EnrichedObject::new("thing", 1, map),
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn test_extra_wins_over_fields() {
        let mut obj = object(json!({"name": "a", "stats": null}));
        obj.set_extra("stats", json!({"correct": 5}));
        assert_eq!(obj.get("stats"), Some(&json!({"correct": 5})));
        assert_eq!(obj.get("name"), Some(&json!("a")));

        let json = obj.into_json();
        assert_eq!(
            json,
            json!({"object_type": "thing", "id": 1, "name": "a", "stats": {"correct": 5}})
        );
    }

    #[test]
    fn test_extra_object_seeded_from_base() {
        let mut obj = object(json!({"actions": {"view": "/v/1"}}));
        obj.extra_object_mut("actions")
            .insert("subscribe".to_string(), json!("/s/1"));
        assert_eq!(
            obj.into_json()["actions"],
            json!({"view": "/v/1", "subscribe": "/s/1"})
        );
    }

    #[test]
    fn test_extra_object_replaces_non_map() {
        let mut obj = object(json!({}));
        obj.set_extra("actions", json!("bogus"));
        obj.extra_object_mut("actions").insert("a".to_string(), json!(1));
        assert_eq!(obj.get("actions"), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_record_children_serialized_as_arrays() {
        let child = Record::from_json("child", 2, json!({"x": 1})).unwrap();
        let parent = Record::from_json("parent", 1, json!({}))
            .unwrap()
            .with_children("children", vec![child]);
        assert_eq!(
            parent.into_json(),
            json!({
                "object_type": "parent",
                "id": 1,
                "children": [{"object_type": "child", "id": 2, "x": 1}]
            })
        );
    }

    #[test]
    fn test_from_json_rejects_scalars() {
        assert!(Record::from_json("thing", 1, json!(3)).is_err());
    }
}
