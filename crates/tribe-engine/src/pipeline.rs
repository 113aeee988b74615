//! The orchestration pipeline
//!
//! One pass: resolve config, probe the cache, validate input, render
//! prompts, select a model, prepare parameters, dispatch the provider call,
//! map the payload. The provider call is the only suspension point of
//! consequence; cancellation is honored before dispatch, never after.
//! Provider failures become `Failed` responses without any cross-model
//! retry; every pre-dispatch failure propagates as an error.

use crate::cache::ResponseCache;
use crate::request::{
    FeatureResult, OrchestrationRequest, OrchestrationResponse, Overrides, RequestStatus,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use tribe_core::{Error, FeatureInput, Result};
use tribe_llm::{Message, ModelRegistry, ProviderClient};
use tribe_prompts::{render_prompt, PromptConfig, PromptStore};

/// The orchestration engine
pub struct Orchestrator {
    store: Arc<PromptStore>,
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn ProviderClient>,
    cache: ResponseCache,
}

impl Orchestrator {
    /// Wire the engine over its three collaborators
    #[must_use]
    pub fn new(
        store: Arc<PromptStore>,
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            store,
            registry,
            provider,
            cache: ResponseCache::new(),
        }
    }

    /// Run one orchestration pass for a fresh request
    pub async fn execute(
        &self,
        input: FeatureInput,
        overrides: Overrides,
    ) -> Result<OrchestrationResponse> {
        self.execute_request(OrchestrationRequest::new(input, overrides))
            .await
    }

    /// Run one orchestration pass for an existing request.
    ///
    /// A request cancelled before this call (or any time up to dispatch)
    /// short-circuits with a `Cancelled` response and never reaches the
    /// provider.
    #[instrument(skip(self, request), fields(feature = %request.feature, request = %request.id))]
    pub async fn execute_request(
        &self,
        mut request: OrchestrationRequest,
    ) -> Result<OrchestrationResponse> {
        let start = Instant::now();
        let feature = request.feature;

        let config = self.resolve_config(&request).await?;

        let cache_key = if config.cache_enabled {
            let key = ResponseCache::key(feature, &request.input)?;
            if let Some(mut hit) = self.cache.get(&key).await {
                hit.request_id = request.id.clone();
                hit.cached = true;
                return Ok(hit);
            }
            Some(key)
        } else {
            None
        };

        request.input.validate()?;
        let variables = request.input.to_variables();
        let missing: Vec<String> = feature
            .required_input_keys()
            .iter()
            .filter(|key| !variables.contains_key(**key))
            .map(|key| format!("missing required input key: {key}"))
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(missing));
        }

        let system = self.store.get_template(&config.system_template_id).await?;
        let user = self.store.get_template(&config.user_template_id).await?;
        let system_prompt = render_prompt(&system, &variables)?;
        let user_prompt = render_prompt(&user, &variables)?;

        let mut messages = vec![Message::system(system_prompt.content)];
        if let Some(id) = &config.assistant_template_id {
            let assistant = self.store.get_template(id).await?;
            messages.push(Message::assistant(render_prompt(&assistant, &variables)?.content));
        }
        if let FeatureInput::Conversation { history, .. } = &request.input {
            for turn in history {
                let message = match turn.role.as_str() {
                    "system" => Message::system(turn.content.clone()),
                    "assistant" => Message::assistant(turn.content.clone()),
                    _ => Message::user(turn.content.clone()),
                };
                messages.push(message);
            }
        }
        messages.push(Message::user(user_prompt.content));

        let model = self
            .registry
            .model_for_feature(feature, request.overrides.model_id.as_deref())
            .await?;
        let raw_parameters = request.overrides.parameters.clone().unwrap_or_default();
        let parameters = self
            .registry
            .validate_and_prepare(&model.id, &raw_parameters)
            .await?;

        if request.status == RequestStatus::Cancelled {
            debug!("request cancelled before dispatch");
            return Ok(self.terminal(&request, RequestStatus::Cancelled, None, Value::Null, &model.id, start, None));
        }
        request.transition(RequestStatus::Processing)?;

        debug!(model = %model.id, messages = messages.len(), "dispatching chat completion");
        let completion = match self
            .provider
            .generate_chat_completion(&messages, &model.id, &parameters)
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                request.transition(RequestStatus::Failed)?;
                warn!(error = %e, model = %model.id, "provider call failed");
                return Ok(self.terminal(
                    &request,
                    RequestStatus::Failed,
                    None,
                    Value::Null,
                    &model.id,
                    start,
                    Some(e.to_string()),
                ));
            }
        };

        let raw = serde_json::to_value(&completion).unwrap_or(Value::Null);
        match FeatureResult::from_content(feature, &completion.message.content) {
            Ok(result) => {
                request.transition(RequestStatus::Completed)?;
                let response = self.terminal(
                    &request,
                    RequestStatus::Completed,
                    Some(result),
                    raw,
                    &model.id,
                    start,
                    None,
                );
                if let Some(key) = cache_key {
                    self.cache
                        .put(key, response.clone(), Duration::from_secs(config.cache_ttl_secs))
                        .await;
                }
                info!(
                    model = %model.id,
                    elapsed_ms = response.processing_time_ms,
                    "request completed"
                );
                Ok(response)
            }
            Err(e) => {
                request.transition(RequestStatus::Failed)?;
                warn!(error = %e, model = %model.id, "payload mapping failed");
                Ok(self.terminal(
                    &request,
                    RequestStatus::Failed,
                    None,
                    raw,
                    &model.id,
                    start,
                    Some(e.to_string()),
                ))
            }
        }
    }

    /// Drop every cached response
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Engine liveness: the registry serves models and the provider answers
    pub async fn health(&self) -> bool {
        self.registry.health().await && self.provider.check_health().await
    }

    async fn resolve_config(&self, request: &OrchestrationRequest) -> Result<Arc<PromptConfig>> {
        match &request.overrides.config_id {
            Some(id) => {
                let config = self.store.get_config(id).await?;
                if config.feature != request.feature {
                    return Err(Error::Conflict(format!(
                        "config {id} belongs to feature {}, not {}",
                        config.feature, request.feature
                    )));
                }
                if !config.active {
                    return Err(Error::Conflict(format!("config {id} is inactive")));
                }
                Ok(config)
            }
            None => self.store.default_config_for_feature(request.feature).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn terminal(
        &self,
        request: &OrchestrationRequest,
        status: RequestStatus,
        result: Option<FeatureResult>,
        raw: Value,
        model_id: &str,
        start: Instant,
        error: Option<String>,
    ) -> OrchestrationResponse {
        OrchestrationResponse {
            request_id: request.id.clone(),
            feature: request.feature,
            status,
            result,
            raw,
            model_id: model_id.to_string(),
            processing_time_ms: start.elapsed().as_millis() as u64,
            error,
            cached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tribe_core::Feature;
    use tribe_llm::provider::mock::MockProvider;
    use tribe_prompts::{fallback_templates, render, MemoryRepository};

    async fn orchestrator_with(provider: MockProvider) -> Orchestrator {
        let registry = Arc::new(ModelRegistry::new(Arc::new(
            MockProvider::with_default_catalog(),
        )));
        registry.initialize().await.unwrap();
        let store = Arc::new(PromptStore::new(Arc::new(MemoryRepository::new())));
        Orchestrator::new(store, registry, Arc::new(provider))
    }

    fn matching_input() -> FeatureInput {
        FeatureInput::matching(
            json!({"name": "Ada", "interests": ["hiking"]}),
            vec![json!({"tribeId": "t1"})],
        )
    }

    /// The reply the scripted provider must be keyed on: exactly what the
    /// pipeline renders from the fallback user template.
    fn rendered_user_prompt(feature: Feature, input: &FeatureInput) -> String {
        let (_, user) = fallback_templates(feature);
        render(&user, &input.to_variables()).unwrap()
    }

    #[tokio::test]
    async fn conversation_completes_end_to_end() {
        let provider = MockProvider::new().with_response("hello", "hi there");
        let orchestrator = orchestrator_with(provider).await;

        let response = orchestrator
            .execute(FeatureInput::conversation("hello"), Overrides::none())
            .await
            .unwrap();

        assert_eq!(response.status, RequestStatus::Completed);
        assert_eq!(response.feature, Feature::Conversation);
        assert_eq!(response.model_id, "openai/gpt-3.5-turbo");
        assert!(!response.cached);
        assert!(response.error.is_none());
        assert!(!response.raw.is_null());
        assert_eq!(
            response.result,
            Some(FeatureResult::Conversation {
                message: "hi there".to_string()
            })
        );
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_dispatch() {
        let orchestrator = orchestrator_with(MockProvider::new()).await;
        let err = orchestrator
            .execute(FeatureInput::conversation("   "), Overrides::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn matching_payload_maps_to_match_entries() {
        let input = matching_input();
        let prompt = rendered_user_prompt(Feature::Matching, &input);
        let provider = MockProvider::new().with_response(
            prompt,
            r#"[{"tribeId": "t1", "compatibilityScore": 82, "compatibilityReasoning": "shared interests"}]"#,
        );
        let orchestrator = orchestrator_with(provider).await;

        let response = orchestrator
            .execute(input, Overrides::none())
            .await
            .unwrap();
        assert_eq!(response.status, RequestStatus::Completed);
        // Matching prefers gpt-4 and the default catalog serves it.
        assert_eq!(response.model_id, "openai/gpt-4");
        match response.result {
            Some(FeatureResult::Matching { matches }) => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0]["compatibilityScore"], json!(82));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn eligible_model_override_is_honored() {
        let provider = MockProvider::new().with_response("hello", "hi");
        let orchestrator = orchestrator_with(provider).await;

        let response = orchestrator
            .execute(
                FeatureInput::conversation("hello"),
                Overrides::none().with_model("anthropic/claude-2"),
            )
            .await
            .unwrap();
        assert_eq!(response.model_id, "anthropic/claude-2");
    }

    #[tokio::test]
    async fn ineligible_model_override_falls_back() {
        let input = matching_input();
        let prompt = rendered_user_prompt(Feature::Matching, &input);
        let provider = MockProvider::new().with_response(prompt, "[]");
        let orchestrator = orchestrator_with(provider).await;

        // claude-instant-1 only offers chat completion; matching also
        // requires text generation.
        let response = orchestrator
            .execute(
                input,
                Overrides::none().with_model("anthropic/claude-instant-1"),
            )
            .await
            .unwrap();
        assert_eq!(response.status, RequestStatus::Completed);
        assert_ne!(response.model_id, "anthropic/claude-instant-1");
    }

    #[tokio::test]
    async fn provider_failure_becomes_a_failed_response() {
        let provider = MockProvider::new().with_failure(Some(500), "backend down");
        let orchestrator = orchestrator_with(provider).await;

        let response = orchestrator
            .execute(FeatureInput::conversation("hello"), Overrides::none())
            .await
            .unwrap();
        assert_eq!(response.status, RequestStatus::Failed);
        assert!(response.result.is_none());
        assert!(response.error.as_deref().unwrap().contains("backend down"));
    }

    #[tokio::test]
    async fn malformed_payload_becomes_a_failed_response() {
        let input = matching_input();
        let prompt = rendered_user_prompt(Feature::Matching, &input);
        let provider = MockProvider::new().with_response(prompt, "not json at all");
        let orchestrator = orchestrator_with(provider).await;

        let response = orchestrator
            .execute(input, Overrides::none())
            .await
            .unwrap();
        assert_eq!(response.status, RequestStatus::Failed);
        assert!(response.error.as_deref().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn completed_responses_are_served_from_cache() {
        let provider = MockProvider::new().with_response("hello", "hi there");
        let orchestrator = orchestrator_with(provider).await;

        let first = orchestrator
            .execute(FeatureInput::conversation("hello"), Overrides::none())
            .await
            .unwrap();
        let second = orchestrator
            .execute(FeatureInput::conversation("hello"), Overrides::none())
            .await
            .unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.result, second.result);
        assert_ne!(first.request_id, second.request_id);

        orchestrator.clear_cache().await;
        let third = orchestrator
            .execute(FeatureInput::conversation("hello"), Overrides::none())
            .await
            .unwrap();
        assert!(!third.cached);
    }

    #[tokio::test]
    async fn cancelled_request_never_reaches_the_provider() {
        // A dispatch would fail loudly; cancellation must win instead.
        let provider = MockProvider::new().with_failure(Some(500), "backend down");
        let orchestrator = orchestrator_with(provider).await;

        let mut request =
            OrchestrationRequest::new(FeatureInput::conversation("hello"), Overrides::none());
        request.cancel().unwrap();

        let response = orchestrator.execute_request(request).await.unwrap();
        assert_eq!(response.status, RequestStatus::Cancelled);
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn config_override_must_match_the_feature() {
        let orchestrator = orchestrator_with(MockProvider::new()).await;
        let engagement_config = orchestrator
            .store
            .default_config_for_feature(Feature::Engagement)
            .await
            .unwrap();

        let err = orchestrator
            .execute(
                FeatureInput::conversation("hello"),
                Overrides::none().with_config(engagement_config.id.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn health_requires_registry_and_provider() {
        let healthy = orchestrator_with(MockProvider::new()).await;
        assert!(healthy.health().await);

        let unhealthy = orchestrator_with(MockProvider::new().unhealthy()).await;
        assert!(!unhealthy.health().await);
    }
}
