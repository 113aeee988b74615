//! Prompt templates and their declared variable schemas
//!
//! A template's placeholder set and its declared variable names must form a
//! bijection: every `{{placeholder}}` is declared, every declared variable
//! is used. Dotted placeholders (`{{user.name}}`) count under their
//! top-level identifier.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tribe_core::{Error, Feature, Result};
use uuid::Uuid;

/// Message slot a template renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    /// System instructions
    System,
    /// User message
    User,
    /// Assistant priming message
    Assistant,
}

/// Declared runtime shape of a template variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl VariableType {
    /// Structural check of a supplied value against this type
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// A declared template variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVariable {
    /// Variable name; must match a top-level placeholder
    pub name: String,
    /// Declared runtime shape
    #[serde(rename = "type")]
    pub var_type: VariableType,
    /// Whether the variable must be supplied (directly or via default)
    pub required: bool,
    /// Default used when a non-required variable is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PromptVariable {
    /// Declare a required variable
    #[must_use]
    pub fn required(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
            required: true,
            default: None,
        }
    }

    /// Declare an optional variable with a default value
    #[must_use]
    pub fn with_default(name: impl Into<String>, var_type: VariableType, default: Value) -> Self {
        Self {
            name: name.into(),
            var_type,
            required: false,
            default: Some(default),
        }
    }
}

/// A stored prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    /// Template id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Template text with `{{name}}` / `{{name.path}}` placeholders
    pub template: String,
    /// Declared variables; names must biject with top-level placeholders
    pub variables: Vec<PromptVariable>,
    /// Message slot this template renders into
    pub category: PromptCategory,
    /// Feature the template serves
    pub feature: Feature,
    /// Monotonic version, bumped on update
    pub version: u32,
    /// Inactive templates are kept but not served
    pub active: bool,
}

impl PromptTemplate {
    /// Create a new version-1 active template with a fresh id
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        variables: Vec<PromptVariable>,
        category: PromptCategory,
        feature: Feature,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            template: template.into(),
            variables,
            category,
            feature,
            version: 1,
            active: true,
        }
    }

    /// Enforce the placeholder/variable bijection, aggregating every
    /// violation in both directions.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push("template name must not be empty".to_string());
        }
        if self.template.trim().is_empty() {
            violations.push("template text must not be empty".to_string());
        }

        let placeholders = extract_variables(&self.template);
        let declared: BTreeSet<String> =
            self.variables.iter().map(|v| v.name.clone()).collect();

        for placeholder in &placeholders {
            if !declared.contains(placeholder) {
                violations.push(format!("undeclared placeholder: {placeholder}"));
            }
        }
        for name in &declared {
            if !placeholders.contains(name) {
                violations.push(format!("declared variable never used: {name}"));
            }
        }
        if declared.len() != self.variables.len() {
            violations.push("duplicate variable declaration".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(violations))
        }
    }

    /// Look up a declared variable by name
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&PromptVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

pub(crate) fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}\}")
            .expect("placeholder regex is valid")
    })
}

/// Every placeholder path in a template, in order of first appearance
#[must_use]
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut paths = Vec::new();
    for capture in placeholder_regex().captures_iter(template) {
        let path = capture[1].to_string();
        if seen.insert(path.clone()) {
            paths.push(path);
        }
    }
    paths
}

/// The set of top-level placeholder identifiers in a template.
///
/// Dotted paths register only their first segment: `{{user.name}}` requires
/// the variable `user`.
#[must_use]
pub fn extract_variables(template: &str) -> BTreeSet<String> {
    extract_placeholders(template)
        .into_iter()
        .map(|path| match path.split_once('.') {
            Some((head, _)) => head.to_string(),
            None => path,
        })
        .collect()
}
