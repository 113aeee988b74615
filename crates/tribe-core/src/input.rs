//! Strongly-typed per-feature request payloads
//!
//! Each feature carries its own input schema, validated on entry. The
//! variants convert into a flat variable graph keyed by the feature's
//! required input keys, which the prompt renderer walks during
//! substitution.

use crate::error::{Error, Result};
use crate::feature::Feature;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Prompt types accepted by the engagement feature
pub const ENGAGEMENT_PROMPT_TYPES: &[&str] = &["conversation", "activity", "challenge", "reflection"];

/// One prior turn of an assistant conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    /// Speaker role ("system", "user" or "assistant")
    pub role: String,
    /// Turn content
    pub content: String,
}

/// Feature-specific orchestration input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FeatureInput {
    /// Match a user against candidate tribes
    Matching {
        /// The user's profile document
        user_profile: Value,
        /// Candidate tribe documents
        tribes: Vec<Value>,
    },
    /// Analyze personality assessment responses
    PersonalityAnalysis {
        /// Raw assessment response document
        assessment_data: Value,
    },
    /// Generate engagement prompts for a tribe
    Engagement {
        /// Tribe document including member profiles
        tribe_data: Value,
        /// Kind of prompt to generate; defaults to "conversation"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_type: Option<String>,
        /// Number of prompts; defaults to 3
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    /// Recommend local events for a tribe
    Recommendation {
        /// Tribe document including member profiles
        tribe_data: Value,
        /// Location to search
        location: String,
        /// Date range to search; defaults to "next 7 days"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date_range: Option<String>,
        /// Number of recommendations; defaults to 3
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    /// Direct assistant conversation
    Conversation {
        /// The new user message
        message: String,
        /// Prior turns, oldest first
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        history: Vec<ChatTurn>,
    },
}

impl FeatureInput {
    /// Create a matching input
    #[must_use]
    pub fn matching(user_profile: Value, tribes: Vec<Value>) -> Self {
        Self::Matching {
            user_profile,
            tribes,
        }
    }

    /// Create a personality analysis input
    #[must_use]
    pub fn personality_analysis(assessment_data: Value) -> Self {
        Self::PersonalityAnalysis { assessment_data }
    }

    /// Create an engagement input with defaults
    #[must_use]
    pub fn engagement(tribe_data: Value) -> Self {
        Self::Engagement {
            tribe_data,
            prompt_type: None,
            count: None,
        }
    }

    /// Create a recommendation input with defaults
    #[must_use]
    pub fn recommendation(tribe_data: Value, location: impl Into<String>) -> Self {
        Self::Recommendation {
            tribe_data,
            location: location.into(),
            date_range: None,
            count: None,
        }
    }

    /// Create a conversation input without history
    #[must_use]
    pub fn conversation(message: impl Into<String>) -> Self {
        Self::Conversation {
            message: message.into(),
            history: Vec::new(),
        }
    }

    /// The feature this input belongs to
    #[must_use]
    pub fn feature(&self) -> Feature {
        match self {
            Self::Matching { .. } => Feature::Matching,
            Self::PersonalityAnalysis { .. } => Feature::PersonalityAnalysis,
            Self::Engagement { .. } => Feature::Engagement,
            Self::Recommendation { .. } => Feature::Recommendation,
            Self::Conversation { .. } => Feature::Conversation,
        }
    }

    /// Validate the payload, aggregating every violation
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        match self {
            Self::Matching {
                user_profile,
                tribes,
            } => {
                if !user_profile.is_object() {
                    violations.push("userProfile must be an object".to_string());
                }
                if tribes.is_empty() {
                    violations.push("tribes must not be empty".to_string());
                }
                if tribes.iter().any(|t| !t.is_object()) {
                    violations.push("every tribe entry must be an object".to_string());
                }
            }
            Self::PersonalityAnalysis { assessment_data } => {
                match assessment_data.as_object() {
                    Some(map) if !map.is_empty() => {}
                    Some(_) => violations.push("assessmentData must not be empty".to_string()),
                    None => violations.push("assessmentData must be an object".to_string()),
                }
            }
            Self::Engagement {
                tribe_data,
                prompt_type,
                count,
            } => {
                if !tribe_data.is_object() {
                    violations.push("tribeData must be an object".to_string());
                }
                if let Some(kind) = prompt_type {
                    if !ENGAGEMENT_PROMPT_TYPES.contains(&kind.as_str()) {
                        violations.push(format!(
                            "promptType must be one of {}",
                            ENGAGEMENT_PROMPT_TYPES.join(", ")
                        ));
                    }
                }
                if let Some(n) = count {
                    if !(1..=10).contains(n) {
                        violations.push("count must be between 1 and 10".to_string());
                    }
                }
            }
            Self::Recommendation {
                tribe_data,
                location,
                count,
                ..
            } => {
                if !tribe_data.is_object() {
                    violations.push("tribeData must be an object".to_string());
                }
                if location.trim().is_empty() {
                    violations.push("location must not be empty".to_string());
                }
                if let Some(n) = count {
                    if !(1..=10).contains(n) {
                        violations.push("count must be between 1 and 10".to_string());
                    }
                }
            }
            Self::Conversation { message, history } => {
                if message.trim().is_empty() {
                    violations.push("message must not be empty".to_string());
                }
                for turn in history {
                    if !matches!(turn.role.as_str(), "system" | "user" | "assistant") {
                        violations.push(format!("invalid history role: {}", turn.role));
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(violations))
        }
    }

    /// Flatten into the variable graph the renderer substitutes from.
    ///
    /// Keys match `Feature::required_input_keys`; optional fields fall back
    /// to the platform defaults.
    #[must_use]
    pub fn to_variables(&self) -> Map<String, Value> {
        let mut vars = Map::new();
        match self {
            Self::Matching {
                user_profile,
                tribes,
            } => {
                vars.insert("userProfile".to_string(), user_profile.clone());
                vars.insert("tribes".to_string(), Value::Array(tribes.clone()));
            }
            Self::PersonalityAnalysis { assessment_data } => {
                vars.insert("assessmentData".to_string(), assessment_data.clone());
            }
            Self::Engagement {
                tribe_data,
                prompt_type,
                count,
            } => {
                vars.insert("tribeData".to_string(), tribe_data.clone());
                vars.insert(
                    "promptType".to_string(),
                    json!(prompt_type.as_deref().unwrap_or("conversation")),
                );
                vars.insert("count".to_string(), json!(count.unwrap_or(3)));
            }
            Self::Recommendation {
                tribe_data,
                location,
                date_range,
                count,
            } => {
                vars.insert("tribeData".to_string(), tribe_data.clone());
                vars.insert("location".to_string(), json!(location));
                vars.insert(
                    "dateRange".to_string(),
                    json!(date_range.as_deref().unwrap_or("next 7 days")),
                );
                vars.insert("count".to_string(), json!(count.unwrap_or(3)));
            }
            Self::Conversation { message, history } => {
                vars.insert("message".to_string(), json!(message));
                vars.insert(
                    "history".to_string(),
                    serde_json::to_value(history).unwrap_or(Value::Array(Vec::new())),
                );
            }
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_input_validates_and_flattens() {
        let input = FeatureInput::matching(
            json!({"name": "Ada", "interests": ["hiking"]}),
            vec![json!({"tribeId": "t1"})],
        );
        assert_eq!(input.feature(), Feature::Matching);
        input.validate().unwrap();

        let vars = input.to_variables();
        for key in Feature::Matching.required_input_keys() {
            assert!(vars.contains_key(*key), "missing {key}");
        }
    }

    #[test]
    fn matching_aggregates_all_violations() {
        let input = FeatureInput::matching(json!("not-an-object"), vec![]);
        let err = input.validate().unwrap_err();
        match err {
            Error::Validation(violations) => assert_eq!(violations.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn engagement_defaults_applied_in_variables() {
        let input = FeatureInput::engagement(json!({"tribeId": "t1"}));
        let vars = input.to_variables();
        assert_eq!(vars["promptType"], json!("conversation"));
        assert_eq!(vars["count"], json!(3));
    }

    #[test]
    fn engagement_rejects_unknown_prompt_type() {
        let input = FeatureInput::Engagement {
            tribe_data: json!({}),
            prompt_type: Some("karaoke".to_string()),
            count: Some(99),
        };
        let err = input.validate().unwrap_err();
        match err {
            Error::Validation(violations) => assert_eq!(violations.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn conversation_round_trips_through_serde() {
        let input = FeatureInput::Conversation {
            message: "hi".to_string(),
            history: vec![ChatTurn {
                role: "assistant".to_string(),
                content: "welcome".to_string(),
            }],
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["feature"], "conversation");
        let back: FeatureInput = serde_json::from_value(json).unwrap();
        assert_eq!(back, input);
    }
}
