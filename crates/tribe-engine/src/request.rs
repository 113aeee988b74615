//! Orchestration requests, responses, and the status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tribe_core::{Error, Feature, FeatureInput, Result};
use tribe_llm::ModelParameters;
use uuid::Uuid;

/// Lifecycle state of an orchestration request.
///
/// `Pending → Processing → {Completed | Failed | Cancelled}`, plus
/// `Pending → Cancelled` for requests withdrawn before dispatch. The three
/// right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Accepted, not yet dispatched
    Pending,
    /// Dispatched to the provider
    Processing,
    /// Provider responded and the result was mapped
    Completed,
    /// Provider or mapping failure
    Failed,
    /// Withdrawn before dispatch
    Cancelled,
}

impl RequestStatus {
    /// Whether this state admits no further transitions
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits moving to `next`
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Cancelled)
        )
    }
}

/// Per-request overrides for config, model, and generation parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    /// Use this config instead of the feature default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    /// Prefer this model; ineligible preferences fall back silently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Merged onto the resolved model's defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ModelParameters>,
}

impl Overrides {
    /// No overrides; feature defaults throughout
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Prefer a specific model
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Use a specific config
    #[must_use]
    pub fn with_config(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// Override generation parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// A single pass through the orchestration pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    /// Request id
    pub id: String,
    /// Feature derived from the input variant
    pub feature: Feature,
    /// Typed feature payload
    pub input: FeatureInput,
    /// Per-request overrides
    #[serde(default)]
    pub overrides: Overrides,
    /// Lifecycle state
    pub status: RequestStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl OrchestrationRequest {
    /// Create a pending request with a fresh id
    #[must_use]
    pub fn new(input: FeatureInput, overrides: Overrides) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            feature: input.feature(),
            input,
            overrides,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Move the request to `next`, rejecting invalid transitions
    pub fn transition(&mut self, next: RequestStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Conflict(format!(
                "request {} cannot move from {:?} to {next:?}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Withdraw the request; only effective before dispatch completes
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(RequestStatus::Cancelled)
    }
}

/// Structured result mapped from the provider payload, tagged by feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FeatureResult {
    /// Compatibility entries, one per candidate tribe
    Matching {
        /// Match entries as returned by the model
        matches: Vec<Value>,
    },
    /// Structured personality profile
    PersonalityAnalysis {
        /// Trait profile document
        profile: Value,
    },
    /// Generated engagement prompts
    Engagement {
        /// Prompt entries as returned by the model
        prompts: Vec<Value>,
    },
    /// Recommended events
    Recommendation {
        /// Event entries as returned by the model
        events: Vec<Value>,
    },
    /// Assistant reply
    Conversation {
        /// The assistant message
        message: String,
    },
}

impl FeatureResult {
    /// Map raw assistant content to the feature's result shape.
    ///
    /// Conversation takes the content verbatim; every other feature expects
    /// the JSON document its prompt demands. Models routinely wrap that
    /// document in a code fence or surrounding prose, so the document is
    /// extracted before parsing. A payload that still does not parse to the
    /// expected shape is a provider failure, not an input error.
    pub fn from_content(feature: Feature, content: &str) -> Result<Self> {
        match feature {
            Feature::Conversation => Ok(Self::Conversation {
                message: content.to_string(),
            }),
            Feature::Matching => Ok(Self::Matching {
                matches: parse_array(feature, content)?,
            }),
            Feature::PersonalityAnalysis => {
                let profile: Value = parse_json(feature, content)?;
                if !profile.is_object() {
                    return Err(malformed(feature, "expected a JSON object"));
                }
                Ok(Self::PersonalityAnalysis { profile })
            }
            Feature::Engagement => Ok(Self::Engagement {
                prompts: parse_array(feature, content)?,
            }),
            Feature::Recommendation => Ok(Self::Recommendation {
                events: parse_array(feature, content)?,
            }),
        }
    }
}

/// Pull the JSON document out of a chat reply.
///
/// Preference order: the body of the first code fence, then the span from
/// the first `{` or `[` to the matching last `}` or `]`, then the trimmed
/// reply as-is.
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if !inner.is_empty() {
                return inner;
            }
        }
    }

    if let Some(start) = trimmed.find(|c| c == '{' || c == '[') {
        let close = if trimmed[start..].starts_with('{') {
            trimmed.rfind('}')
        } else {
            trimmed.rfind(']')
        };
        if let Some(end) = close {
            if end > start {
                return trimmed[start..=end].trim();
            }
        }
    }

    trimmed
}

fn parse_json(feature: Feature, content: &str) -> Result<Value> {
    serde_json::from_str(extract_json(content)).map_err(|e| malformed(feature, &e.to_string()))
}

fn parse_array(feature: Feature, content: &str) -> Result<Vec<Value>> {
    match parse_json(feature, content)? {
        Value::Array(items) => Ok(items),
        _ => Err(malformed(feature, "expected a JSON array")),
    }
}

fn malformed(feature: Feature, detail: &str) -> Error {
    Error::Provider {
        status: None,
        message: format!("malformed {feature} payload: {detail}"),
    }
}

/// Outcome of one orchestration pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResponse {
    /// Id of the originating request
    pub request_id: String,
    /// Feature served
    pub feature: Feature,
    /// Terminal status of the request
    pub status: RequestStatus,
    /// Mapped result; present only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FeatureResult>,
    /// Raw provider payload, for audit and debugging
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
    /// Model that served (or would have served) the request
    pub model_id: String,
    /// Wall-clock processing time
    pub processing_time_ms: u64,
    /// Failure detail; present only when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the response was served from the cache
    #[serde(default)]
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn happy_path_transitions_are_permitted() {
        let mut request = OrchestrationRequest::new(
            FeatureInput::conversation("hi"),
            Overrides::none(),
        );
        assert_eq!(request.status, RequestStatus::Pending);
        request.transition(RequestStatus::Processing).unwrap();
        request.transition(RequestStatus::Completed).unwrap();
        assert!(request.status.is_terminal());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut request = OrchestrationRequest::new(
            FeatureInput::conversation("hi"),
            Overrides::none(),
        );
        request.cancel().unwrap();
        let err = request.transition(RequestStatus::Processing).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Completed));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Failed));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Cancelled));
    }

    #[test]
    fn conversation_content_maps_verbatim() {
        let result = FeatureResult::from_content(Feature::Conversation, "hello there").unwrap();
        assert_eq!(
            result,
            FeatureResult::Conversation {
                message: "hello there".to_string()
            }
        );
    }

    #[test]
    fn matching_content_maps_from_a_json_array() {
        let payload = r#"[{"tribeId": "t1", "compatibilityScore": 82}]"#;
        let result = FeatureResult::from_content(Feature::Matching, payload).unwrap();
        match result {
            FeatureResult::Matching { matches } => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0]["tribeId"], json!("t1"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn fenced_payload_is_unwrapped_before_parsing() {
        let payload = "```json\n[{\"tribeId\": \"t1\", \"compatibilityScore\": 82}]\n```";
        let result = FeatureResult::from_content(Feature::Matching, payload).unwrap();
        match result {
            FeatureResult::Matching { matches } => {
                assert_eq!(matches[0]["compatibilityScore"], json!(82));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let bare_fence = "```\n{\"traits\": {\"openness\": 70}}\n```";
        let result =
            FeatureResult::from_content(Feature::PersonalityAnalysis, bare_fence).unwrap();
        match result {
            FeatureResult::PersonalityAnalysis { profile } => {
                assert_eq!(profile["traits"]["openness"], json!(70));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn prose_wrapped_payload_is_unwrapped_before_parsing() {
        let payload = "Here are the matches you asked for: [{\"tribeId\": \"t1\"}] Enjoy!";
        let result = FeatureResult::from_content(Feature::Matching, payload).unwrap();
        match result {
            FeatureResult::Matching { matches } => {
                assert_eq!(matches[0]["tribeId"], json!("t1"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_a_provider_error() {
        let err = FeatureResult::from_content(Feature::Matching, "not json").unwrap_err();
        assert!(matches!(err, Error::Provider { status: None, .. }));

        let err =
            FeatureResult::from_content(Feature::PersonalityAnalysis, "[1, 2]").unwrap_err();
        assert!(matches!(err, Error::Provider { status: None, .. }));
    }
}
