//! Prompt rendering
//!
//! Rendering is pure and all-or-nothing: every placeholder must resolve
//! through the supplied variable graph (or a declared default) before any
//! output is produced. Rendered prompts are request-scoped and never
//! persisted.

use crate::template::{
    extract_placeholders, placeholder_regex, PromptCategory, PromptTemplate, PromptVariable,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tribe_core::{Error, Feature, Result};

/// A fully-substituted, request-scoped prompt
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// Template the content was rendered from
    pub template_id: String,
    /// Substituted prompt text
    pub content: String,
    /// Message slot of the source template
    pub category: PromptCategory,
    /// Feature of the source template
    pub feature: Feature,
    /// Snapshot of the variables used
    pub variables: Map<String, Value>,
    /// Deterministic token estimate for the content
    pub token_count: u32,
    /// Render time
    pub created_at: DateTime<Utc>,
}

/// Deterministic token estimate: one token per four characters, rounded up
#[must_use]
pub fn estimate_token_count(content: &str) -> u32 {
    ((content.len() + 3) / 4) as u32
}

/// Check supplied values against the declared variable schema.
///
/// Every required variable must be present directly or through a declared
/// default, and every supplied value must structurally match its declared
/// type. All violations are aggregated.
pub fn validate_variables(
    declared: &[PromptVariable],
    supplied: &Map<String, Value>,
) -> Result<()> {
    let mut violations = Vec::new();

    for variable in declared {
        match supplied.get(&variable.name) {
            Some(value) => {
                if !variable.var_type.matches(value) {
                    violations.push(format!(
                        "variable {} does not match declared type {:?}",
                        variable.name, variable.var_type
                    ));
                }
            }
            None if variable.required && variable.default.is_none() => {
                violations.push(format!("missing required variable: {}", variable.name));
            }
            None => {}
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(violations))
    }
}

/// Render a template against a variable graph.
///
/// Placeholder paths are walked segment by segment; object segments index
/// maps, numeric segments index arrays. Any unresolved path aborts the
/// render before output is produced.
pub fn render(template: &PromptTemplate, variables: &Map<String, Value>) -> Result<String> {
    validate_variables(&template.variables, variables)?;

    let placeholders = extract_placeholders(&template.template);
    let mut resolved: HashMap<&str, String> = HashMap::with_capacity(placeholders.len());
    let mut violations = Vec::new();

    for path in &placeholders {
        match resolve_path(template, variables, path) {
            Some(value) => {
                resolved.insert(path.as_str(), format_value(&value));
            }
            None => violations.push(format!("unresolved placeholder path: {path}")),
        }
    }

    if !violations.is_empty() {
        return Err(Error::validation(violations));
    }

    // One left-to-right pass over the source: substituted values are
    // emitted verbatim, never rescanned for placeholders of their own.
    let source = &template.template;
    let mut content = String::with_capacity(source.len());
    let mut last = 0;
    for found in placeholder_regex().find_iter(source) {
        content.push_str(&source[last..found.start()]);
        let path = &source[found.start() + 2..found.end() - 2];
        match resolved.get(path) {
            Some(replacement) => content.push_str(replacement),
            None => content.push_str(found.as_str()),
        }
        last = found.end();
    }
    content.push_str(&source[last..]);
    Ok(content)
}

/// Stamp a rendered prompt with its template metadata and token estimate
#[must_use]
pub fn create_rendered_prompt(
    template: &PromptTemplate,
    content: String,
    variables: Map<String, Value>,
) -> RenderedPrompt {
    RenderedPrompt {
        template_id: template.id.clone(),
        token_count: estimate_token_count(&content),
        content,
        category: template.category,
        feature: template.feature,
        variables,
        created_at: Utc::now(),
    }
}

/// Render a template and stamp the result in one step
pub fn render_prompt(
    template: &PromptTemplate,
    variables: &Map<String, Value>,
) -> Result<RenderedPrompt> {
    let content = render(template, variables)?;
    Ok(create_rendered_prompt(template, content, variables.clone()))
}

/// Deterministic, feature-specific augmentation for ad-hoc prompts that
/// have no stored template.
#[must_use]
pub fn optimize_prompt_for_feature(content: &str, feature: Feature) -> String {
    let mut optimized = content.trim().to_string();

    let guidance = match feature {
        Feature::Matching => "Score compatibility from 0 to 100 and justify each score.",
        Feature::PersonalityAnalysis => {
            "Ground every conclusion in the supplied assessment responses."
        }
        Feature::Engagement => "Tailor every suggestion to this specific tribe, never generic.",
        Feature::Recommendation => {
            "Only recommend options that are realistic for the stated location."
        }
        Feature::Conversation => "Keep the tone warm and the answer concise.",
    };
    optimized.push_str("\n\n");
    optimized.push_str(guidance);

    if content.contains("JSON") {
        optimized.push_str(
            "\nEnsure your response is valid JSON and follows the exact format specified above.",
        );
    }

    optimized
}

fn resolve_path(
    template: &PromptTemplate,
    variables: &Map<String, Value>,
    path: &str,
) -> Option<Value> {
    let mut segments = path.split('.');
    let head = segments.next()?;

    let root = match variables.get(head) {
        Some(value) => value.clone(),
        None => template.variable(head)?.default.clone()?,
    };

    let mut current = root;
    for segment in segments {
        current = match &current {
            Value::Object(map) => map.get(segment)?.clone(),
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?.clone()
            }
            _ => return None,
        };
    }
    Some(current)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Nested data is embedded as indented JSON, the way the platform
        // formats profile and tribe documents inside prompts.
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::VariableType;
    use serde_json::json;

    fn greeting_template() -> PromptTemplate {
        PromptTemplate::new(
            "greeting",
            "Hello {{variable1}}, welcome to {{variable2}}!",
            vec![
                PromptVariable::required("variable1", VariableType::String),
                PromptVariable::required("variable2", VariableType::String),
            ],
            PromptCategory::User,
            Feature::Conversation,
        )
    }

    fn vars(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn renders_the_greeting_scenario() {
        let template = greeting_template();
        let variables = vars(&[("variable1", json!("User")), ("variable2", json!("Tribe"))]);
        let content = render(&template, &variables).unwrap();
        assert_eq!(content, "Hello User, welcome to Tribe!");
    }

    #[test]
    fn render_is_deterministic() {
        let template = greeting_template();
        let variables = vars(&[("variable1", json!("User")), ("variable2", json!("Tribe"))]);
        let first = render(&template, &variables).unwrap();
        let second = render(&template, &variables).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn substituted_values_are_never_rescanned() {
        let template = greeting_template();
        let variables = vars(&[
            ("variable1", json!("{{variable2}}")),
            ("variable2", json!("Tribe")),
        ]);
        let content = render(&template, &variables).unwrap();
        assert_eq!(content, "Hello {{variable2}}, welcome to Tribe!");
    }

    #[test]
    fn missing_required_variable_aborts_before_output() {
        let template = greeting_template();
        let variables = vars(&[("variable1", json!("User"))]);
        let err = render(&template, &variables).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn dotted_paths_walk_the_variable_graph() {
        let template = PromptTemplate::new(
            "nested",
            "{{user.name}} lives in {{user.address.city}} with {{user.pets.0}}",
            vec![PromptVariable::required("user", VariableType::Object)],
            PromptCategory::User,
            Feature::Conversation,
        );
        let variables = vars(&[(
            "user",
            json!({
                "name": "Ada",
                "address": {"city": "Seattle"},
                "pets": ["Rex"]
            }),
        )]);
        let content = render(&template, &variables).unwrap();
        assert_eq!(content, "Ada lives in Seattle with Rex");
    }

    #[test]
    fn unresolved_dotted_path_fails_the_whole_render() {
        let template = PromptTemplate::new(
            "nested",
            "{{user.name}} and {{user.missing.deep}}",
            vec![PromptVariable::required("user", VariableType::Object)],
            PromptCategory::User,
            Feature::Conversation,
        );
        let variables = vars(&[("user", json!({"name": "Ada"}))]);
        let err = render(&template, &variables).unwrap_err();
        match err {
            Error::Validation(violations) => {
                assert!(violations[0].contains("user.missing.deep"));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn declared_default_fills_absent_variable() {
        let template = PromptTemplate::new(
            "count",
            "Generate {{count}} prompts",
            vec![PromptVariable::with_default(
                "count",
                VariableType::Number,
                json!(3),
            )],
            PromptCategory::User,
            Feature::Engagement,
        );
        let content = render(&template, &Map::new()).unwrap();
        assert_eq!(content, "Generate 3 prompts");
    }

    #[test]
    fn type_mismatch_is_aggregated_with_other_violations() {
        let declared = vec![
            PromptVariable::required("name", VariableType::String),
            PromptVariable::required("age", VariableType::Number),
        ];
        let supplied = vars(&[("age", json!("forty"))]);
        let err = validate_variables(&declared, &supplied).unwrap_err();
        match err {
            Error::Validation(violations) => assert_eq!(violations.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn nested_values_embed_as_pretty_json() {
        let template = PromptTemplate::new(
            "profile",
            "Profile:\n{{userProfile}}",
            vec![PromptVariable::required("userProfile", VariableType::Object)],
            PromptCategory::User,
            Feature::Matching,
        );
        let variables = vars(&[("userProfile", json!({"name": "Ada"}))]);
        let content = render(&template, &variables).unwrap();
        assert!(content.contains("\"name\": \"Ada\""));
    }

    #[test]
    fn rendered_prompt_carries_metadata_and_token_estimate() {
        let template = greeting_template();
        let variables = vars(&[("variable1", json!("User")), ("variable2", json!("Tribe"))]);
        let rendered = render_prompt(&template, &variables).unwrap();
        assert_eq!(rendered.template_id, template.id);
        assert_eq!(rendered.feature, Feature::Conversation);
        assert_eq!(
            rendered.token_count,
            estimate_token_count("Hello User, welcome to Tribe!")
        );
    }

    #[test]
    fn optimization_is_deterministic_and_feature_specific() {
        let base = "List events. Format your response as JSON.";
        let first = optimize_prompt_for_feature(base, Feature::Recommendation);
        let second = optimize_prompt_for_feature(base, Feature::Recommendation);
        assert_eq!(first, second);
        assert!(first.contains("realistic for the stated location"));
        assert!(first.contains("valid JSON"));

        let other = optimize_prompt_for_feature(base, Feature::Matching);
        assert_ne!(first, other);
    }
}
