//! OpenRouter provider client
//!
//! Implements `ProviderClient` against the OpenRouter gateway, which fronts
//! the OpenAI and Anthropic models the platform actually serves.

use crate::model::{Model, ModelParameters};
use crate::provider::{
    ChatCompletion, Message, MessageRole, ProviderClient, TextGeneration, Usage,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use tribe_core::{Capability, Error, Result};

/// OpenRouter API base URL
pub const BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Mask an API key for logs: first four characters, then an ellipsis
fn mask_api_key(key: &str) -> String {
    if key.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}…", &key[..4])
    }
}

/// Sanitize API error messages before they reach logs or callers
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return "API authentication error. Please check your API key configuration.".to_string();
    }
    if lower.contains("rate limit") || lower.contains("quota") {
        return "API rate limit exceeded. Please try again later.".to_string();
    }

    if error.len() > 300 {
        let mut end = 300;
        while !error.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...(truncated)", &error[..end])
    } else {
        error.to_string()
    }
}

/// OpenRouter client configuration
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// API key
    pub api_key: String,
    /// Base URL
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// App name (for OpenRouter analytics)
    pub app_name: Option<String>,
    /// Site URL (for OpenRouter analytics)
    pub site_url: Option<String>,
}

impl fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl OpenRouterConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            app_name: None,
            site_url: None,
        }
    }

    /// Read configuration from `OPENROUTER_API_KEY` / `OPENROUTER_API_URL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| Error::Config("OPENROUTER_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("OPENROUTER_API_URL") {
            config.base_url = url;
        }
        Ok(config)
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the app name header
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context_length: Option<u32>,
    #[serde(default)]
    architecture: Option<WireArchitecture>,
    #[serde(default)]
    supported_parameters: Option<Vec<String>>,
    #[serde(default)]
    top_provider: Option<WireTopProvider>,
}

#[derive(Debug, Deserialize)]
struct WireArchitecture {
    #[serde(default)]
    modality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTopProvider {
    #[serde(default)]
    max_completion_tokens: Option<u32>,
}

impl WireModel {
    fn into_model(self) -> Model {
        let mut capabilities = std::collections::HashSet::new();
        if self.id.contains("embed") {
            capabilities.insert(Capability::Embedding);
        } else {
            capabilities.insert(Capability::TextGeneration);
            capabilities.insert(Capability::ChatCompletion);
        }
        if self
            .supported_parameters
            .as_deref()
            .is_some_and(|p| p.iter().any(|s| s == "tools"))
        {
            capabilities.insert(Capability::FunctionCalling);
        }
        if self
            .architecture
            .as_ref()
            .and_then(|a| a.modality.as_deref())
            .is_some_and(|m| m.contains("image"))
        {
            capabilities.insert(Capability::ImageUnderstanding);
        }

        let provider = self.id.split('/').next().unwrap_or("openrouter").to_string();
        Model {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            provider,
            capabilities,
            context_window: self.context_length.unwrap_or(4096),
            max_tokens: self
                .top_provider
                .and_then(|p| p.max_completion_tokens)
                .unwrap_or(1000),
            default_parameters: ModelParameters::platform_default(),
            active: true,
            description: self.description,
            metadata: serde_json::Value::Null,
            id: self.id,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// OpenRouter-backed provider client
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    /// Create a new client
    ///
    /// # Errors
    /// Returns a provider error if the HTTP client cannot be created.
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::provider(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenRouterConfig::from_env()?)
    }

    fn wire_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn chat_body<'a>(
        model_id: &'a str,
        messages: &[Message],
        parameters: &ModelParameters,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: model_id,
            messages: Self::wire_messages(messages),
            temperature: parameters.temperature,
            max_tokens: parameters.max_tokens,
            top_p: parameters.top_p,
            presence_penalty: parameters.presence_penalty,
            frequency_penalty: parameters.frequency_penalty,
            stop: parameters.stop_sequences.clone(),
        }
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{path}", self.config.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");
        if let Some(app_name) = &self.config.app_name {
            request = request.header("X-Title", app_name);
        }
        if let Some(site_url) = &self.config.site_url {
            request = request.header("HTTP-Referer", site_url);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| Error::provider(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::provider(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "openrouter request failed");
            return Err(Error::Provider {
                status: Some(status.as_u16()),
                message: sanitize_api_error(&text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::provider(format!("invalid provider response: {e}")))
    }

    fn first_choice(response: ChatResponse, fallback_model: &str) -> Result<ChatCompletion> {
        let model_id = response
            .model
            .unwrap_or_else(|| fallback_model.to_string());
        let usage = response.usage.unwrap_or_default().into();
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("provider returned no choices"))?;
        Ok(ChatCompletion {
            message: Message {
                role: MessageRole::Assistant,
                content: choice.message.content,
            },
            usage,
            model_id,
            finish_reason: choice.finish_reason,
        })
    }
}

#[async_trait::async_trait]
impl ProviderClient for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate_text(
        &self,
        prompt: &str,
        model_id: &str,
        parameters: &ModelParameters,
    ) -> Result<TextGeneration> {
        let messages = [Message::user(prompt)];
        let body = Self::chat_body(model_id, &messages, parameters);
        let response: ChatResponse = self.post("/chat/completions", &body).await?;
        let completion = Self::first_choice(response, model_id)?;
        Ok(TextGeneration {
            content: completion.message.content,
            usage: completion.usage,
            model_id: completion.model_id,
            finish_reason: completion.finish_reason,
        })
    }

    async fn generate_chat_completion(
        &self,
        messages: &[Message],
        model_id: &str,
        parameters: &ModelParameters,
    ) -> Result<ChatCompletion> {
        let body = Self::chat_body(model_id, messages, parameters);
        let response: ChatResponse = self.post("/chat/completions", &body).await?;
        Self::first_choice(response, model_id)
    }

    async fn generate_embedding(&self, text: &str, model_id: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: model_id,
            input: text,
        };
        let response: EmbeddingResponse = self.post("/embeddings", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::provider("provider returned no embedding"))
    }

    async fn list_available_models(&self) -> Result<Vec<Model>> {
        let url = format!("{}/models", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| Error::provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Provider {
                status: Some(status.as_u16()),
                message: sanitize_api_error("model listing failed"),
            });
        }

        let listing: ModelsResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("invalid catalog response: {e}")))?;
        debug!(models = listing.data.len(), "fetched openrouter catalog");
        Ok(listing.data.into_iter().map(WireModel::into_model).collect())
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/models", self.config.base_url);
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_masks_api_key() {
        let config = OpenRouterConfig::new("sk-or-1234567890").with_app_name("tribe");
        let debug = format!("{config:?}");
        assert!(!debug.contains("1234567890"));
        assert!(debug.contains("sk-o"));
    }

    #[test]
    fn sanitize_hides_auth_details() {
        let sanitized = sanitize_api_error("Invalid API key provided: sk-or-abcdef");
        assert!(!sanitized.contains("sk-or"));
        assert!(sanitized.contains("authentication"));
    }

    #[test]
    fn wire_model_capability_inference() {
        let wire = WireModel {
            id: "openai/gpt-4".to_string(),
            name: Some("GPT-4".to_string()),
            description: None,
            context_length: Some(8192),
            architecture: Some(WireArchitecture {
                modality: Some("text+image->text".to_string()),
            }),
            supported_parameters: Some(vec!["tools".to_string(), "temperature".to_string()]),
            top_provider: Some(WireTopProvider {
                max_completion_tokens: Some(4096),
            }),
        };
        let model = wire.into_model();
        assert!(model.capabilities.contains(&Capability::ChatCompletion));
        assert!(model.capabilities.contains(&Capability::FunctionCalling));
        assert!(model.capabilities.contains(&Capability::ImageUnderstanding));
        assert_eq!(model.provider, "openai");
        assert_eq!(model.context_window, 8192);
        assert_eq!(model.max_tokens, 4096);

        let embed = WireModel {
            id: "openai/text-embedding-3-small".to_string(),
            name: None,
            description: None,
            context_length: None,
            architecture: None,
            supported_parameters: None,
            top_provider: None,
        };
        let model = embed.into_model();
        assert!(model.capabilities.contains(&Capability::Embedding));
        assert!(!model.capabilities.contains(&Capability::ChatCompletion));
    }

    #[test]
    fn chat_body_serializes_only_present_parameters() {
        let params = ModelParameters {
            temperature: Some(0.3),
            ..Default::default()
        };
        let messages = [Message::user("hi")];
        let body = OpenRouterClient::chat_body("openai/gpt-4", &messages, &params);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["temperature"], 0.3);
        assert!(json.get("top_p").is_none());
        assert!(json.get("stop").is_none());
    }
}
