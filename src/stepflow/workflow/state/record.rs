// SPDX-License-Identifier: MIT

//! State records and partial updates

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::type_name;
use crate::sdk::error::StateError;

/// Open key-value state shared by all steps of a workflow.
///
/// Fields are added by merging partial updates. A merge only ever inserts or
/// replaces keys, so a field set once survives every later merge that omits it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateRecord {
    fields: Map<String, Value>,
}

impl StateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(StateError::NotAnObject(type_name(&other).to_string())),
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a single field, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Shallow overwrite-by-key merge. Returns the keys that were written.
    pub fn merge(&mut self, update: PartialState) -> Vec<String> {
        let mut changed = Vec::with_capacity(update.fields.len());
        for (key, value) in update.fields {
            changed.push(key.clone());
            self.fields.insert(key, value);
        }
        changed
    }

    /// Merged copy of this record, leaving `self` untouched
    pub fn merged(&self, update: PartialState) -> Self {
        let mut next = self.clone();
        next.merge(update);
        next
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for StateRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StateRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// The subset of state fields a step changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialState {
    fields: Map<String, Value>,
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an update from a JSON object
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(StateError::NotAnObject(type_name(&other).to_string())),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for PartialState {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for PartialState {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_state() {
        let state = StateRecord::new();
        assert!(state.get("anything").is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn test_merge_overwrites_present_keys_only() {
        let mut state: StateRecord = [("count", json!(0)), ("name", json!("news"))]
            .into_iter()
            .collect();

        let changed = state.merge(PartialState::new().with("count", json!(2)));

        assert_eq!(changed, vec!["count".to_string()]);
        assert_eq!(state.get("count"), Some(&json!(2)));
        assert_eq!(state.get("name"), Some(&json!("news")));
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut state = StateRecord::new();
        state.set("meta", json!({"a": 1, "b": 2}));

        state.merge(PartialState::new().with("meta", json!({"c": 3})));

        // Nested objects are replaced, not deep-merged
        assert_eq!(state.get("meta"), Some(&json!({"c": 3})));
    }

    #[test]
    fn test_merge_with_empty_update_is_noop() {
        let mut state = StateRecord::new();
        state.set("results", json!(["a"]));
        let before = state.clone();

        let changed = state.merge(PartialState::new());

        assert!(changed.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_null_overwrites_instead_of_dropping() {
        let mut state = StateRecord::new();
        state.set("draft", json!("text"));

        state.merge(PartialState::new().with("draft", Value::Null));

        assert!(state.contains("draft"));
        assert_eq!(state.get("draft"), Some(&Value::Null));
    }

    #[test]
    fn test_merged_leaves_original_untouched() {
        let state: StateRecord = [("count", json!(1))].into_iter().collect();
        let next = state.merged(PartialState::new().with("count", json!(5)));

        assert_eq!(state.get("count"), Some(&json!(1)));
        assert_eq!(next.get("count"), Some(&json!(5)));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(StateRecord::from_value(json!({"count": 0})).is_ok());
        assert_eq!(
            StateRecord::from_value(json!([1, 2])).unwrap_err(),
            StateError::NotAnObject("array".to_string())
        );
        assert!(PartialState::from_value(json!("text")).is_err());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let state: StateRecord = [("a", json!(1)), ("b", json!("hello"))]
            .into_iter()
            .collect();

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, json!({"a": 1, "b": "hello"}));

        let back: StateRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
