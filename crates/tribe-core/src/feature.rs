//! Features and model capabilities
//!
//! A `Feature` is one of the platform's AI-driven use cases; a `Capability`
//! is a discrete generation ability a model may offer. The static tables on
//! `Feature` (required capabilities, required input keys, preferred model)
//! are consumed by the registry, the pipeline, and the prompt store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A discrete generation ability offered by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Single-prompt text generation
    TextGeneration,
    /// Multi-turn chat completion
    ChatCompletion,
    /// Vector embedding generation
    Embedding,
    /// Structured function/tool calling
    FunctionCalling,
    /// Image understanding
    ImageUnderstanding,
}

impl Capability {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextGeneration => "text_generation",
            Self::ChatCompletion => "chat_completion",
            Self::Embedding => "embedding",
            Self::FunctionCalling => "function_calling",
            Self::ImageUnderstanding => "image_understanding",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the platform's AI-driven use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Matchmaking: user-to-tribe compatibility scoring
    Matching,
    /// Personality profiling from assessment responses
    PersonalityAnalysis,
    /// Conversation prompts, challenges, and activities for a tribe
    Engagement,
    /// Local event and activity recommendations
    Recommendation,
    /// Direct assistant conversation
    Conversation,
}

impl Feature {
    /// Every feature, in declaration order
    pub const ALL: [Feature; 5] = [
        Feature::Matching,
        Feature::PersonalityAnalysis,
        Feature::Engagement,
        Feature::Recommendation,
        Feature::Conversation,
    ];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matching => "matching",
            Self::PersonalityAnalysis => "personality_analysis",
            Self::Engagement => "engagement",
            Self::Recommendation => "recommendation",
            Self::Conversation => "conversation",
        }
    }

    /// Capabilities a model must offer to serve this feature
    #[must_use]
    pub fn required_capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Matching | Self::PersonalityAnalysis => {
                &[Capability::TextGeneration, Capability::ChatCompletion]
            }
            Self::Engagement | Self::Recommendation | Self::Conversation => {
                &[Capability::ChatCompletion]
            }
        }
    }

    /// Input keys the pipeline requires before rendering prompts
    #[must_use]
    pub fn required_input_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Matching => &["userProfile", "tribes"],
            Self::PersonalityAnalysis => &["assessmentData"],
            Self::Engagement => &["tribeData"],
            Self::Recommendation => &["tribeData", "location"],
            Self::Conversation => &["message"],
        }
    }

    /// Per-feature default model, used by the selector when no preferred
    /// model is given or the preferred one is ineligible
    #[must_use]
    pub fn preferred_model(&self) -> &'static str {
        match self {
            Self::Matching | Self::PersonalityAnalysis => "openai/gpt-4",
            Self::Engagement | Self::Recommendation => "anthropic/claude-instant-1",
            Self::Conversation => "openai/gpt-3.5-turbo",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
