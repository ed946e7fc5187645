// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Definitions
//!
//! Payload of the workflow ledger. A definition is immutable once stored;
//! editing a workflow means evolving its concept into a new version.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::versioning::Versioned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Deprecated,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Deprecated => "deprecated",
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(WorkflowStatus::Draft),
            "active" => Ok(WorkflowStatus::Active),
            "deprecated" => Ok(WorkflowStatus::Deprecated),
            other => Err(format!("unknown workflow status '{}'", other)),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default = "empty_object")]
    pub input_schema: Value,
    #[serde(default = "empty_object")]
    pub output_schema: Value,
    /// Email of the principal that produced this version.
    #[serde(default)]
    pub created_by: String,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            status: WorkflowStatus::Draft,
            input_schema: empty_object(),
            output_schema: empty_object(),
            created_by: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("workflow name must not be empty".to_string());
        }
        if !self.input_schema.is_object() {
            return Err("input_schema must be a JSON object".to_string());
        }
        if !self.output_schema.is_object() {
            return Err("output_schema must be a JSON object".to_string());
        }
        Ok(())
    }
}

pub type WorkflowVersion = Versioned<WorkflowDefinition>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_defaults_when_deserialized() {
        let def: WorkflowDefinition = serde_json::from_str(r#"{"name":"Summarizer"}"#).unwrap();
        assert_eq!(def.status, WorkflowStatus::Draft);
        assert!(def.input_schema.is_object());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_name_and_non_object_schema() {
        assert!(WorkflowDefinition::new("  ").validate().is_err());

        let mut def = WorkflowDefinition::new("Summarizer");
        def.output_schema = serde_json::json!([1, 2]);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_status_parses_case_insensitively() {
        assert_eq!("Deprecated".parse::<WorkflowStatus>().unwrap(), WorkflowStatus::Deprecated);
        assert!("retired".parse::<WorkflowStatus>().is_err());
    }
}
