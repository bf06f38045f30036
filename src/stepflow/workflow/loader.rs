//! Workflow loader - YAML file loading and parsing
//!
//! This module handles loading workflow definitions from YAML files.

use super::types::WorkflowDefinition;
use crate::sdk::error::{StepflowError, WorkflowError};
use std::fs;
use std::path::Path;

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<WorkflowDefinition, StepflowError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        let def = Self::parse_yaml(&content)?;
        log::debug!(
            "Loaded workflow '{}' ({} steps) from {}",
            def.name,
            def.steps.len(),
            path.display()
        );
        Ok(def)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, StepflowError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepflow::workflow::state::FieldType;
    use crate::stepflow::workflow::types::Next;
    use serde_json::json;

    #[test]
    fn test_parse_linear_workflow() {
        let yaml = r#"
name: news
description: "Fetch and summarize"

state:
  count: { type: number, default: 0 }
  results: { type: array }

steps:
  - name: load
    uses: set
    with:
      count: 2
  - name: process
  - name: summarize
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "news");
        assert_eq!(def.description, "Fetch and summarize");
        assert!(!def.allow_cycles);
        assert_eq!(def.steps.len(), 3);

        let load = &def.steps[0];
        assert_eq!(load.uses.as_deref(), Some("set"));
        assert_eq!(load.params.get("count"), Some(&json!(2)));
        assert!(def.steps[1].uses.is_none());

        let count = def.state.fields.get("count").unwrap();
        assert_eq!(count.field_type, FieldType::Number);
        assert_eq!(count.default, Some(json!(0)));
        assert_eq!(def.state.fields["results"].field_type, FieldType::Array);
    }

    #[test]
    fn test_parse_explicit_next_and_cycles() {
        let yaml = r#"
name: retry
allow_cycles: true
steps:
  - name: attempt
  - name: check
    next: attempt
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert!(def.allow_cycles);
        assert_eq!(def.description, "");
        assert_eq!(def.steps[0].next, Next::Following);
        assert_eq!(def.steps[1].next, Next::Step("attempt".to_string()));
    }

    #[test]
    fn test_state_section_is_optional() {
        let def = WorkflowLoader::parse_yaml("name: bare\nsteps: []").unwrap();
        assert!(def.state.is_empty());
        assert!(def.steps.is_empty());
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let yaml = r#"
name:
  - invalid structure
steps: []
"#;
        let result = WorkflowLoader::parse_yaml(yaml);
        assert!(matches!(result, Err(StepflowError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = WorkflowLoader::new()
            .load_workflow("does/not/exist.yaml")
            .unwrap_err();
        assert!(matches!(
            err,
            StepflowError::Workflow(WorkflowError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        fs::write(&path, "name: disk\nsteps:\n  - name: only\n    uses: fail\n").unwrap();

        let def = WorkflowLoader::new().load_workflow(&path).unwrap();
        assert_eq!(def.name, "disk");
        assert_eq!(def.steps[0].uses.as_deref(), Some("fail"));
    }
}
