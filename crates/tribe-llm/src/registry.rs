//! Model registry and capability-based selection
//!
//! The registry owns an immutable snapshot of the provider catalog.
//! Refresh builds a whole new snapshot and swaps one `Arc`, so concurrent
//! readers see either the pre- or post-refresh catalog, never a torn one.

use crate::model::{Model, ModelParameters};
use crate::provider::ProviderClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use tribe_core::{Capability, Error, Feature, Result};

/// One generation of the catalog
#[derive(Debug, Default)]
struct CatalogSnapshot {
    models: HashMap<String, Arc<Model>>,
    by_capability: HashMap<Capability, Vec<String>>,
    initialized: bool,
}

impl CatalogSnapshot {
    fn build(models: Vec<Model>) -> Self {
        let mut index: HashMap<Capability, Vec<String>> = HashMap::new();
        let mut map = HashMap::new();
        for model in models {
            for capability in &model.capabilities {
                index
                    .entry(*capability)
                    .or_default()
                    .push(model.id.clone());
            }
            map.insert(model.id.clone(), Arc::new(model));
        }
        for ids in index.values_mut() {
            ids.sort();
        }
        Self {
            models: map,
            by_capability: index,
            initialized: true,
        }
    }
}

/// Catalog registry and model selector
pub struct ModelRegistry {
    provider: Arc<dyn ProviderClient>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
}

impl ModelRegistry {
    /// Create an uninitialized registry over a provider client
    #[must_use]
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }

    /// Pull the full catalog and build the first snapshot.
    ///
    /// Only active models are retained. Fails with a configuration error
    /// when the provider returns an empty catalog.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn initialize(&self) -> Result<()> {
        self.refresh_models().await
    }

    /// Re-pull the catalog and atomically replace the snapshot
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn refresh_models(&self) -> Result<()> {
        let catalog = self.provider.list_available_models().await?;
        let total = catalog.len();
        let active: Vec<Model> = catalog.into_iter().filter(|m| m.active).collect();

        if active.is_empty() {
            warn!(total, "provider returned no active models");
            return Err(Error::Config(
                "model catalog is empty or has no active models".to_string(),
            ));
        }

        info!(total, active = active.len(), "model catalog refreshed");
        let next = Arc::new(CatalogSnapshot::build(active));
        *self.snapshot.write().await = next;
        Ok(())
    }

    /// Look up an active model by id
    pub async fn get_model(&self, id: &str) -> Result<Arc<Model>> {
        let snapshot = self.snapshot.read().await.clone();
        snapshot
            .models
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: "model",
                id: id.to_string(),
            })
    }

    /// Active models whose capability set is a superset of `required`
    pub async fn models_by_capability(&self, required: &[Capability]) -> Vec<Arc<Model>> {
        let snapshot = self.snapshot.read().await.clone();
        let mut matched: Vec<Arc<Model>> = snapshot
            .models
            .values()
            .filter(|m| m.supports(required))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Resolve the model to serve `feature`.
    ///
    /// A preferred model that is active and satisfies the feature's
    /// capability requirement is returned immediately, skipping the
    /// fallback search. Otherwise the pick is deterministic: the
    /// per-feature default model when eligible, else the largest context
    /// window with ties broken by id ascending.
    pub async fn model_for_feature(
        &self,
        feature: Feature,
        preferred: Option<&str>,
    ) -> Result<Arc<Model>> {
        let required = feature.required_capabilities();

        if let Some(id) = preferred {
            match self.get_model(id).await {
                Ok(model) if model.supports(required) => {
                    debug!(%feature, model = %model.id, "preferred model eligible");
                    return Ok(model);
                }
                Ok(model) => {
                    debug!(%feature, model = %model.id, "preferred model lacks required capabilities, falling back");
                }
                Err(_) => {
                    debug!(%feature, model = id, "preferred model unknown or inactive, falling back");
                }
            }
        }

        let eligible = self.models_by_capability(required).await;
        if eligible.is_empty() {
            return Err(Error::NoEligibleModel { feature });
        }

        let default_id = feature.preferred_model();
        if let Some(model) = eligible.iter().find(|m| m.id == default_id) {
            debug!(%feature, model = %model.id, "selected feature default model");
            return Ok(model.clone());
        }

        // eligible is id-ascending; iterating reversed makes max_by_key
        // (which keeps the last maximum) land on the lowest id among ties.
        let model = eligible
            .iter()
            .rev()
            .max_by_key(|m| m.context_window)
            .cloned()
            .ok_or(Error::NoEligibleModel { feature })?;
        debug!(%feature, model = %model.id, "selected largest context window model");
        Ok(model)
    }

    /// Resolve the model, merge `raw` onto its defaults, and validate the
    /// merged result.
    pub async fn validate_and_prepare(
        &self,
        model_id: &str,
        raw: &ModelParameters,
    ) -> Result<ModelParameters> {
        let model = self.get_model(model_id).await?;
        let merged = raw.merge_with_defaults(&model.default_parameters);
        merged.validate()?;
        Ok(merged)
    }

    /// True iff the registry has been initialized and serves at least one
    /// active model
    pub async fn health(&self) -> bool {
        let snapshot = self.snapshot.read().await.clone();
        snapshot.initialized && !snapshot.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::{default_catalog, MockProvider};

    async fn ready_registry() -> ModelRegistry {
        let registry = ModelRegistry::new(Arc::new(MockProvider::with_default_catalog()));
        registry.initialize().await.unwrap();
        registry
    }

    #[tokio::test]
    async fn initialize_fails_on_empty_catalog() {
        let registry = ModelRegistry::new(Arc::new(MockProvider::new()));
        let err = registry.initialize().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!registry.health().await);
    }

    #[tokio::test]
    async fn initialize_drops_inactive_models() {
        let mut catalog = default_catalog();
        catalog[0].active = false;
        let inactive_id = catalog[0].id.clone();
        let registry = ModelRegistry::new(Arc::new(MockProvider::new().with_catalog(catalog)));
        registry.initialize().await.unwrap();

        let err = registry.get_model(&inactive_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "model", .. }));
        assert!(registry.health().await);
    }

    #[tokio::test]
    async fn selection_returns_capability_superset_for_every_feature() {
        let registry = ready_registry().await;
        for feature in Feature::ALL {
            let model = registry.model_for_feature(feature, None).await.unwrap();
            assert!(
                model.supports(feature.required_capabilities()),
                "{feature} got ineligible model {}",
                model.id
            );
        }
    }

    #[tokio::test]
    async fn eligible_preferred_model_short_circuits() {
        let registry = ready_registry().await;
        let model = registry
            .model_for_feature(Feature::Conversation, Some("anthropic/claude-instant-1"))
            .await
            .unwrap();
        assert_eq!(model.id, "anthropic/claude-instant-1");
    }

    #[tokio::test]
    async fn ineligible_preferred_model_falls_back_to_another() {
        let registry = ready_registry().await;
        // claude-instant-1 only offers chat completion; matching also needs
        // text generation.
        let model = registry
            .model_for_feature(Feature::Matching, Some("anthropic/claude-instant-1"))
            .await
            .unwrap();
        assert_ne!(model.id, "anthropic/claude-instant-1");
        assert!(model.supports(Feature::Matching.required_capabilities()));
    }

    #[tokio::test]
    async fn no_eligible_model_is_an_error() {
        let mut catalog = default_catalog();
        for model in &mut catalog {
            model.capabilities.remove(&Capability::ChatCompletion);
        }
        let registry = ModelRegistry::new(Arc::new(MockProvider::new().with_catalog(catalog)));
        registry.initialize().await.unwrap();

        let err = registry
            .model_for_feature(Feature::Conversation, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NoEligibleModel {
                feature: Feature::Conversation
            }
        ));
    }

    #[tokio::test]
    async fn fallback_prefers_largest_context_window_then_id() {
        // No feature default present; matching falls back across the two
        // claude models... claude-2 supports text generation, instant does
        // not, so force the tie among custom models instead.
        let mut catalog = default_catalog();
        catalog.retain(|m| m.provider == "anthropic");
        let registry = ModelRegistry::new(Arc::new(MockProvider::new().with_catalog(catalog)));
        registry.initialize().await.unwrap();

        let model = registry
            .model_for_feature(Feature::Conversation, None)
            .await
            .unwrap();
        // Both have 100k context; id ascending breaks the tie.
        assert_eq!(model.id, "anthropic/claude-2");
    }

    #[tokio::test]
    async fn refresh_swaps_catalog_atomically() {
        let registry = ready_registry().await;
        assert!(registry.get_model("openai/gpt-4").await.is_ok());

        // Registry keeps serving the old snapshot if refresh fails.
        let failing = ModelRegistry::new(Arc::new(
            MockProvider::new().with_failure(Some(503), "catalog down"),
        ));
        assert!(failing.refresh_models().await.is_err());

        registry.refresh_models().await.unwrap();
        assert!(registry.get_model("openai/gpt-4").await.is_ok());
    }

    #[tokio::test]
    async fn validate_and_prepare_merges_and_bounds() {
        let registry = ready_registry().await;
        let raw = ModelParameters {
            temperature: Some(0.1),
            ..Default::default()
        };
        let prepared = registry
            .validate_and_prepare("openai/gpt-4", &raw)
            .await
            .unwrap();
        assert_eq!(prepared.temperature, Some(0.1));
        assert_eq!(prepared.max_tokens, Some(1000));

        let bad = ModelParameters {
            temperature: Some(9.0),
            ..Default::default()
        };
        let err = registry
            .validate_and_prepare("openai/gpt-4", &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = registry
            .validate_and_prepare("nope/unknown", &raw)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
