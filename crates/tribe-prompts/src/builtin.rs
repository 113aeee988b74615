//! Built-in fallback templates
//!
//! Used to synthesize a default config when a feature has none. The texts
//! are the platform's stock prompts; every template satisfies the
//! placeholder/variable bijection.

use crate::template::{PromptCategory, PromptTemplate, PromptVariable, VariableType};
use serde_json::json;
use tribe_core::Feature;

/// The stock system and user templates for a feature
#[must_use]
pub fn fallback_templates(feature: Feature) -> (PromptTemplate, PromptTemplate) {
    match feature {
        Feature::Matching => (
            system(
                feature,
                "You are an AI matchmaker for a social platform called Tribe. You analyze \
                 personality traits, interests, and communication styles to assess group \
                 compatibility. Always respond in the exact JSON format requested.",
            ),
            PromptTemplate::new(
                "matching-user-fallback",
                "User Profile:\n{{userProfile}}\n\nPotential Tribes:\n{{tribes}}\n\n\
                 Analyze the compatibility between the user and each tribe. Consider \
                 personality balance, shared interests, and communication style \
                 compatibility. Provide a compatibility score (0-100) for each tribe and \
                 explain your reasoning.\n\nFormat your response as a JSON array with \
                 objects containing tribeId, compatibilityScore, and \
                 compatibilityReasoning.",
                vec![
                    PromptVariable::required("userProfile", VariableType::Object),
                    PromptVariable::required("tribes", VariableType::Array),
                ],
                PromptCategory::User,
                feature,
            ),
        ),
        Feature::PersonalityAnalysis => (
            system(
                feature,
                "You are an AI personality analyst for a social platform called Tribe. You \
                 analyze assessment responses and produce structured personality profiles. \
                 Always respond in the exact JSON format requested.",
            ),
            PromptTemplate::new(
                "personality-user-fallback",
                "Assessment Data:\n{{assessmentData}}\n\nIdentify the Big Five personality \
                 traits with scores (0-100), the communication style, social preferences, \
                 and key strengths in social settings.\n\nFormat your response as a JSON \
                 object with traits, communicationStyle, socialPreferences, and insights \
                 sections.",
                vec![PromptVariable::required(
                    "assessmentData",
                    VariableType::Object,
                )],
                PromptCategory::User,
                feature,
            ),
        ),
        Feature::Engagement => (
            system(
                feature,
                "You are an AI engagement specialist for a social platform called Tribe. \
                 You generate conversation prompts, challenges, and activities tailored to \
                 a specific tribe. Always respond in the exact JSON format requested.",
            ),
            PromptTemplate::new(
                "engagement-user-fallback",
                "Tribe Data:\n{{tribeData}}\n\nGenerate {{count}} engaging prompts of type \
                 \"{{promptType}}\" that will spark meaningful interaction among tribe \
                 members. Each prompt should be specific to this tribe's composition and \
                 interests, not generic.\n\nFormat your response as a JSON array of prompt \
                 objects, each with a prompt text and a brief explanation of why it would \
                 work well for this tribe.",
                vec![
                    PromptVariable::required("tribeData", VariableType::Object),
                    PromptVariable::with_default(
                        "promptType",
                        VariableType::String,
                        json!("conversation"),
                    ),
                    PromptVariable::with_default("count", VariableType::Number, json!(3)),
                ],
                PromptCategory::User,
                feature,
            ),
        ),
        Feature::Recommendation => (
            system(
                feature,
                "You are an AI event specialist for a social platform called Tribe. You \
                 recommend local events and activities matched to a tribe's shared \
                 interests. Always respond in the exact JSON format requested.",
            ),
            PromptTemplate::new(
                "recommendation-user-fallback",
                "Tribe Data:\n{{tribeData}}\n\nLocation: {{location}}\nDate Range: \
                 {{dateRange}}\n\nRecommend {{count}} events in the specified location and \
                 date range that would appeal to this tribe based on their shared \
                 interests and group composition.\n\nFormat your response as a JSON array \
                 of event objects with a title, description, venue, estimated cost, and a \
                 matchReason explaining the personalized recommendation.",
                vec![
                    PromptVariable::required("tribeData", VariableType::Object),
                    PromptVariable::required("location", VariableType::String),
                    PromptVariable::with_default(
                        "dateRange",
                        VariableType::String,
                        json!("next 7 days"),
                    ),
                    PromptVariable::with_default("count", VariableType::Number, json!(3)),
                ],
                PromptCategory::User,
                feature,
            ),
        ),
        Feature::Conversation => (
            system(
                feature,
                "You are a helpful AI assistant for the Tribe platform, which helps people \
                 form meaningful local connections. Be warm, concise, and practical.",
            ),
            PromptTemplate::new(
                "conversation-user-fallback",
                "{{message}}",
                vec![PromptVariable::required("message", VariableType::String)],
                PromptCategory::User,
                feature,
            ),
        ),
    }
}

fn system(feature: Feature, text: &str) -> PromptTemplate {
    PromptTemplate::new(
        format!("{feature}-system-fallback"),
        text,
        Vec::new(),
        PromptCategory::System,
        feature,
    )
}
