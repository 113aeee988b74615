//! Model catalog entries and generation parameters
//!
//! `ModelParameters` carries the tunables a caller may override per
//! request. Validation checks every field against its documented range and
//! aggregates all violations; merging is field-wise with `stop_sequences`
//! replaced wholesale, never element-merged.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tribe_core::{Capability, Error, Result};

/// A model in the provider catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Catalog id, e.g. "openai/gpt-4"
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Provider the model belongs to
    pub provider: String,
    /// Generation abilities this model offers
    pub capabilities: HashSet<Capability>,
    /// Context window in tokens
    pub context_window: u32,
    /// Maximum tokens the model may generate per request
    pub max_tokens: u32,
    /// Parameter defaults applied when a caller omits a field
    #[serde(default)]
    pub default_parameters: ModelParameters,
    /// Inactive models are retained in the catalog source but never served
    pub active: bool,
    /// Optional catalog description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Provider-specific metadata, passed through untouched
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Model {
    /// Whether this model's capability set is a superset of `required`
    #[must_use]
    pub fn supports(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}

/// Generation parameters
///
/// Every field is optional; absent fields inherit the model's defaults
/// during merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameters {
    /// Sampling temperature, 0.0 to 1.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate, must be positive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold, 0.0 to 1.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Presence penalty, -2.0 to 2.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Frequency penalty, -2.0 to 2.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Stop sequences, ordered; replaced wholesale on merge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl ModelParameters {
    /// The defaults the platform configures for catalog models
    #[must_use]
    pub fn platform_default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(1000),
            top_p: Some(1.0),
            presence_penalty: Some(0.0),
            frequency_penalty: Some(0.0),
            stop_sequences: None,
        }
    }

    /// Check every present field against its range, aggregating all
    /// violations into a single `Validation` error.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                violations.push(format!("temperature must be between 0 and 1, got {t}"));
            }
        }
        if let Some(m) = self.max_tokens {
            if m == 0 {
                violations.push("maxTokens must be greater than 0".to_string());
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                violations.push(format!("topP must be between 0 and 1, got {p}"));
            }
        }
        if let Some(p) = self.presence_penalty {
            if !(-2.0..=2.0).contains(&p) {
                violations.push(format!("presencePenalty must be between -2 and 2, got {p}"));
            }
        }
        if let Some(p) = self.frequency_penalty {
            if !(-2.0..=2.0).contains(&p) {
                violations.push(format!("frequencyPenalty must be between -2 and 2, got {p}"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(violations))
        }
    }

    /// Field-wise merge: every field present in `self` wins, absent fields
    /// inherit from `defaults`. A non-empty `stop_sequences` in `self`
    /// replaces the default list wholesale.
    #[must_use]
    pub fn merge_with_defaults(&self, defaults: &ModelParameters) -> ModelParameters {
        let stop_sequences = match &self.stop_sequences {
            Some(seqs) if !seqs.is_empty() => Some(seqs.clone()),
            _ => defaults.stop_sequences.clone(),
        };

        ModelParameters {
            temperature: self.temperature.or(defaults.temperature),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            top_p: self.top_p.or(defaults.top_p),
            presence_penalty: self.presence_penalty.or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.or(defaults.frequency_penalty),
            stop_sequences,
        }
    }
}
