// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::record::{PartialState, StateRecord};
use crate::sdk::error::StateError;

/// Optional declaration of the fields a workflow's state may carry.
///
/// Every field is optional: a missing key is always valid. When a declared
/// field is present its value must match the declared type; `null` is accepted
/// for any type and means "unset". Undeclared fields are not checked.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Value filled into the initial state when the caller omits the field
    pub default: Option<Value>,
}

/// Supported field types
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Any, _) | (_, Value::Null) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

/// JSON type name of a value, for error messages
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl StateSchema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a single field value against its declaration
    pub fn check_field(&self, field: &str, value: &Value) -> Result<(), StateError> {
        match self.fields.get(field) {
            Some(def) if !def.field_type.matches(value) => Err(StateError::TypeMismatch {
                field: field.to_string(),
                expected: def.field_type.to_string(),
                actual: type_name(value).to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Check every field of a partial update
    pub fn check_update(&self, update: &PartialState) -> Result<(), StateError> {
        for (field, value) in update.iter() {
            self.check_field(field, value)?;
        }
        Ok(())
    }

    /// Check every field of a full record
    pub fn check_record(&self, record: &StateRecord) -> Result<(), StateError> {
        for (field, value) in record.iter() {
            self.check_field(field, value)?;
        }
        Ok(())
    }

    /// Fill declared defaults into fields the record does not have yet
    pub fn apply_defaults(&self, record: &mut StateRecord) {
        for (name, def) in &self.fields {
            if let Some(default) = &def.default {
                if !record.contains(name) {
                    record.set(name.clone(), default.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_schema_deserialize() {
        let yaml = r#"
            current_step:
              type: string
            total_count:
              type: number
              default: 0
            session_notes:
              type: array
        "#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields["current_step"].field_type, FieldType::String);
        assert_eq!(schema.fields["total_count"].field_type, FieldType::Number);
        assert_eq!(schema.fields["total_count"].default, Some(json!(0)));
        assert_eq!(schema.fields["session_notes"].field_type, FieldType::Array);
    }

    #[test]
    fn test_field_type_defaults_to_any() {
        let yaml = r#"
            anything: { default: "x" }
        "#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.fields["anything"].field_type, FieldType::Any);
    }

    #[test]
    fn test_check_field_type_mismatch() {
        let schema: StateSchema = serde_yaml::from_str("count: { type: number }").unwrap();

        assert!(schema.check_field("count", &json!(3)).is_ok());
        assert!(schema.check_field("count", &json!(null)).is_ok());
        assert!(schema.check_field("other", &json!("free")).is_ok());

        let err = schema.check_field("count", &json!("three")).unwrap_err();
        assert_eq!(
            err,
            StateError::TypeMismatch {
                field: "count".to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_check_update() {
        let schema: StateSchema =
            serde_yaml::from_str("results: { type: array }\nflag: { type: boolean }").unwrap();

        let ok = PartialState::new().with("results", json!(["a"]));
        assert!(schema.check_update(&ok).is_ok());

        let bad = PartialState::new()
            .with("results", json!(["a"]))
            .with("flag", json!("yes"));
        assert!(schema.check_update(&bad).is_err());
    }

    #[test]
    fn test_apply_defaults_keeps_existing_values() {
        let schema: StateSchema = serde_yaml::from_str(
            "count: { type: number, default: 0 }\nname: { type: string, default: anon }",
        )
        .unwrap();

        let mut record = StateRecord::new();
        record.set("count", json!(7));
        schema.apply_defaults(&mut record);

        assert_eq!(record.get("count"), Some(&json!(7)));
        assert_eq!(record.get("name"), Some(&json!("anon")));
    }

    #[test]
    fn test_all_field_types() {
        let yaml = r#"
            str_field: { type: string }
            num_field: { type: number }
            bool_field: { type: boolean }
            arr_field: { type: array }
            obj_field: { type: object }
            any_field: { type: any }
        "#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(schema.fields["str_field"].field_type, FieldType::String);
        assert_eq!(schema.fields["num_field"].field_type, FieldType::Number);
        assert_eq!(schema.fields["bool_field"].field_type, FieldType::Boolean);
        assert_eq!(schema.fields["arr_field"].field_type, FieldType::Array);
        assert_eq!(schema.fields["obj_field"].field_type, FieldType::Object);
        assert_eq!(schema.fields["any_field"].field_type, FieldType::Any);
    }
}
