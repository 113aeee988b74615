//! Provider client contract
//!
//! This module defines the contract the orchestration engine consumes from
//! an external model provider, plus the message and usage types on its
//! wire. Implementations live alongside (`openrouter`) or in tests
//! (`mock`).

use crate::model::{Model, ModelParameters};
use serde::{Deserialize, Serialize};
use tribe_core::Result;

/// Role in a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl MessageRole {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Result of a single-prompt text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGeneration {
    /// Generated content
    pub content: String,
    /// Token usage
    pub usage: Usage,
    /// Model that produced the output
    pub model_id: String,
    /// Finish reason reported by the provider
    pub finish_reason: Option<String>,
}

/// Result of a chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletion {
    /// The assistant message produced
    pub message: Message,
    /// Token usage
    pub usage: Usage,
    /// Model that produced the output
    pub model_id: String,
    /// Finish reason reported by the provider
    pub finish_reason: Option<String>,
}

/// Contract for an external language-model provider
///
/// The engine only selects and invokes models; everything behind this trait
/// (transport, authentication, timeouts) belongs to the implementation.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name, for logging
    fn name(&self) -> &str;

    /// Generate text from a single prompt
    async fn generate_text(
        &self,
        prompt: &str,
        model_id: &str,
        parameters: &ModelParameters,
    ) -> Result<TextGeneration>;

    /// Generate a response for a conversation
    async fn generate_chat_completion(
        &self,
        messages: &[Message],
        model_id: &str,
        parameters: &ModelParameters,
    ) -> Result<ChatCompletion>;

    /// Generate an embedding vector for a text
    async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<Vec<f32>>;

    /// List the provider's model catalog
    async fn list_available_models(&self) -> Result<Vec<Model>>;

    /// Provider liveness; never fails, any error maps to `false`
    async fn check_health(&self) -> bool;
}

pub mod mock {
    //! In-memory provider used by tests and local development
    //!
    //! Responses are keyed by the prompt (or last user message); unknown
    //! keys fall back to a canned reply so callers always get content.

    use super::{ChatCompletion, Message, MessageRole, ProviderClient, TextGeneration, Usage};
    use crate::model::{Model, ModelParameters};
    use std::collections::{HashMap, HashSet};
    use tribe_core::{Capability, Error, Result};

    /// Scripted provider client
    #[derive(Debug, Default)]
    pub struct MockProvider {
        catalog: Vec<Model>,
        responses: HashMap<String, String>,
        failure: Option<(Option<u16>, String)>,
        unhealthy: bool,
    }

    impl MockProvider {
        /// Create an empty mock provider
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a mock provider serving the built-in catalog
        #[must_use]
        pub fn with_default_catalog() -> Self {
            Self {
                catalog: default_catalog(),
                ..Self::default()
            }
        }

        /// Replace the catalog
        #[must_use]
        pub fn with_catalog(mut self, catalog: Vec<Model>) -> Self {
            self.catalog = catalog;
            self
        }

        /// Script a response for a specific prompt
        #[must_use]
        pub fn with_response(mut self, prompt: impl Into<String>, reply: impl Into<String>) -> Self {
            self.responses.insert(prompt.into(), reply.into());
            self
        }

        /// Make every call fail with a provider error
        #[must_use]
        pub fn with_failure(mut self, status: Option<u16>, message: impl Into<String>) -> Self {
            self.failure = Some((status, message.into()));
            self
        }

        /// Report unhealthy from `check_health`
        #[must_use]
        pub fn unhealthy(mut self) -> Self {
            self.unhealthy = true;
            self
        }

        fn fail_if_scripted(&self) -> Result<()> {
            if let Some((status, message)) = &self.failure {
                return Err(Error::Provider {
                    status: *status,
                    message: message.clone(),
                });
            }
            Ok(())
        }

        fn reply_for(&self, key: &str) -> String {
            self.responses
                .get(key)
                .cloned()
                .unwrap_or_else(|| format!("Mock response for: {key}"))
        }
    }

    #[async_trait::async_trait]
    impl ProviderClient for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate_text(
            &self,
            prompt: &str,
            model_id: &str,
            _parameters: &ModelParameters,
        ) -> Result<TextGeneration> {
            self.fail_if_scripted()?;
            let content = self.reply_for(prompt);
            Ok(TextGeneration {
                usage: usage_for(prompt, &content),
                content,
                model_id: model_id.to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }

        async fn generate_chat_completion(
            &self,
            messages: &[Message],
            model_id: &str,
            _parameters: &ModelParameters,
        ) -> Result<ChatCompletion> {
            self.fail_if_scripted()?;
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            let content = self.reply_for(last_user);
            Ok(ChatCompletion {
                usage: usage_for(last_user, &content),
                message: Message::assistant(content),
                model_id: model_id.to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }

        async fn generate_embedding(&self, text: &str, _model_id: &str) -> Result<Vec<f32>> {
            self.fail_if_scripted()?;
            // Deterministic toy embedding, enough for plumbing tests.
            Ok(text.bytes().take(8).map(|b| f32::from(b) / 255.0).collect())
        }

        async fn list_available_models(&self) -> Result<Vec<Model>> {
            self.fail_if_scripted()?;
            Ok(self.catalog.clone())
        }

        async fn check_health(&self) -> bool {
            !self.unhealthy && self.failure.is_none()
        }
    }

    fn usage_for(prompt: &str, completion: &str) -> Usage {
        let prompt_tokens = (prompt.len() / 4) as u32;
        let completion_tokens = (completion.len() / 4) as u32;
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// The catalog the platform ships for local development
    #[must_use]
    pub fn default_catalog() -> Vec<Model> {
        let chat_only: HashSet<Capability> = [Capability::ChatCompletion].into_iter().collect();
        let full_text: HashSet<Capability> = [
            Capability::TextGeneration,
            Capability::ChatCompletion,
            Capability::FunctionCalling,
        ]
        .into_iter()
        .collect();

        vec![
            Model {
                id: "openai/gpt-4".to_string(),
                name: "GPT-4".to_string(),
                provider: "openai".to_string(),
                capabilities: full_text.clone(),
                context_window: 8192,
                max_tokens: 1000,
                default_parameters: ModelParameters::platform_default(),
                active: true,
                description: None,
                metadata: serde_json::Value::Null,
            },
            Model {
                id: "openai/gpt-3.5-turbo".to_string(),
                name: "GPT-3.5 Turbo".to_string(),
                provider: "openai".to_string(),
                capabilities: full_text,
                context_window: 4096,
                max_tokens: 1000,
                default_parameters: ModelParameters::platform_default(),
                active: true,
                description: None,
                metadata: serde_json::Value::Null,
            },
            Model {
                id: "anthropic/claude-2".to_string(),
                name: "Claude 2".to_string(),
                provider: "anthropic".to_string(),
                capabilities: [Capability::TextGeneration, Capability::ChatCompletion]
                    .into_iter()
                    .collect(),
                context_window: 100_000,
                max_tokens: 1000,
                default_parameters: ModelParameters::platform_default(),
                active: true,
                description: None,
                metadata: serde_json::Value::Null,
            },
            Model {
                id: "anthropic/claude-instant-1".to_string(),
                name: "Claude Instant".to_string(),
                provider: "anthropic".to_string(),
                capabilities: chat_only,
                context_window: 100_000,
                max_tokens: 1000,
                default_parameters: ModelParameters::platform_default(),
                active: true,
                description: None,
                metadata: serde_json::Value::Null,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProvider;
    use super::*;
    use crate::model::ModelParameters;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("a").role, MessageRole::System);
        assert_eq!(Message::user("b").role, MessageRole::User);
        assert_eq!(Message::assistant("c").role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn mock_replies_to_last_user_message() {
        let provider = MockProvider::new().with_response("hello", "hi there");
        let messages = vec![Message::system("sys"), Message::user("hello")];
        let reply = provider
            .generate_chat_completion(&messages, "openai/gpt-4", &ModelParameters::default())
            .await
            .unwrap();
        assert_eq!(reply.message.content, "hi there");
        assert_eq!(reply.message.role, MessageRole::Assistant);
        assert_eq!(reply.model_id, "openai/gpt-4");
    }

    #[tokio::test]
    async fn scripted_failure_maps_health_to_false() {
        let provider = MockProvider::new().with_failure(Some(500), "backend down");
        assert!(!provider.check_health().await);
        let err = provider
            .generate_text("p", "m", &ModelParameters::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            tribe_core::Error::Provider {
                status: Some(500),
                ..
            }
        ));
    }
}
