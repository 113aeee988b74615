//! Template and config store
//!
//! CRUD over prompt templates and per-feature config bundles, backed by a
//! persistent key-value-with-filters collaborator and fronted by an
//! in-memory cache with manual invalidation (no TTL; a write to an entity
//! refreshes its cache entry, `clear_cache` drops everything).

use crate::builtin::fallback_templates;
use crate::template::{PromptCategory, PromptTemplate, PromptVariable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use tribe_core::{Error, Feature, Result};
use uuid::Uuid;

/// Default response-cache TTL carried on new configs, in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// A per-feature bundle of prompt templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    /// Config id
    pub id: String,
    /// Feature the bundle serves
    pub feature: Feature,
    /// System template id
    pub system_template_id: String,
    /// User template id
    pub user_template_id: String,
    /// Optional assistant priming template id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_template_id: Option<String>,
    /// At most one active default exists per feature
    pub is_default: bool,
    /// Inactive configs are kept but not served
    pub active: bool,
    /// Whether the pipeline may cache responses produced with this config
    #[serde(default)]
    pub cache_enabled: bool,
    /// Response-cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

impl PromptConfig {
    /// Create a new active, non-default config with a fresh id
    #[must_use]
    pub fn new(
        feature: Feature,
        system_template_id: impl Into<String>,
        user_template_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            feature,
            system_template_id: system_template_id.into(),
            user_template_id: user_template_id.into(),
            assistant_template_id: None,
            is_default: false,
            active: true,
            cache_enabled: false,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }

    /// Mark as the feature default
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Enable response caching with the given TTL
    #[must_use]
    pub fn with_caching(mut self, ttl_secs: u64) -> Self {
        self.cache_enabled = true;
        self.cache_ttl_secs = ttl_secs;
        self
    }

    /// Whether this config references the template in any slot
    #[must_use]
    pub fn references(&self, template_id: &str) -> bool {
        self.system_template_id == template_id
            || self.user_template_id == template_id
            || self.assistant_template_id.as_deref() == Some(template_id)
    }
}

/// Field filter for config queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFilter {
    /// Match configs for this feature
    pub feature: Option<Feature>,
    /// Match on the default flag
    pub is_default: Option<bool>,
    /// Match on the active flag
    pub active: Option<bool>,
    /// Match configs referencing this template in any slot
    pub references_template: Option<String>,
}

impl ConfigFilter {
    /// Filter the active default config of a feature
    #[must_use]
    pub fn feature_default(feature: Feature) -> Self {
        Self {
            feature: Some(feature),
            is_default: Some(true),
            active: Some(true),
            references_template: None,
        }
    }

    /// Filter configs referencing a template
    #[must_use]
    pub fn referencing(template_id: impl Into<String>) -> Self {
        Self {
            references_template: Some(template_id.into()),
            ..Self::default()
        }
    }

    /// Whether a config matches this filter
    #[must_use]
    pub fn matches(&self, config: &PromptConfig) -> bool {
        self.feature.map_or(true, |f| config.feature == f)
            && self.is_default.map_or(true, |d| config.is_default == d)
            && self.active.map_or(true, |a| config.active == a)
            && self
                .references_template
                .as_deref()
                .map_or(true, |id| config.references(id))
    }
}

/// Partial template update
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    /// New name
    pub name: Option<String>,
    /// New template text
    pub template: Option<String>,
    /// Replacement variable declarations
    pub variables: Option<Vec<PromptVariable>>,
    /// New category
    pub category: Option<PromptCategory>,
    /// New active flag
    pub active: Option<bool>,
}

/// Partial config update
///
/// The default flag is deliberately absent; it only moves through
/// `PromptStore::set_default_config_for_feature`.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    /// New system template id
    pub system_template_id: Option<String>,
    /// New user template id
    pub user_template_id: Option<String>,
    /// New assistant template id (`Some(None)` clears the slot)
    pub assistant_template_id: Option<Option<String>>,
    /// New active flag
    pub active: Option<bool>,
    /// New cache flag
    pub cache_enabled: Option<bool>,
    /// New cache TTL
    pub cache_ttl_secs: Option<u64>,
}

/// Persistent store collaborator: a filtered key-value interface
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PromptRepository: Send + Sync {
    /// Persist a new template
    async fn create_template(&self, template: &PromptTemplate) -> Result<()>;
    /// Fetch a template by id
    async fn find_template(&self, id: &str) -> Result<Option<PromptTemplate>>;
    /// Replace a stored template
    async fn update_template(&self, template: &PromptTemplate) -> Result<()>;
    /// Delete a template by id
    async fn delete_template(&self, id: &str) -> Result<()>;

    /// Persist a new config
    async fn create_config(&self, config: &PromptConfig) -> Result<()>;
    /// Fetch a config by id
    async fn find_config(&self, id: &str) -> Result<Option<PromptConfig>>;
    /// Fetch configs matching a field filter
    async fn find_configs(&self, filter: &ConfigFilter) -> Result<Vec<PromptConfig>>;
    /// Replace a stored config
    async fn update_config(&self, config: &PromptConfig) -> Result<()>;
    /// Delete a config by id
    async fn delete_config(&self, id: &str) -> Result<()>;
}

/// In-memory repository used by tests and local development
#[derive(Debug, Default)]
pub struct MemoryRepository {
    templates: RwLock<HashMap<String, PromptTemplate>>,
    configs: RwLock<HashMap<String, PromptConfig>>,
}

impl MemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PromptRepository for MemoryRepository {
    async fn create_template(&self, template: &PromptTemplate) -> Result<()> {
        let mut templates = self.templates.write().await;
        if templates.contains_key(&template.id) {
            return Err(Error::Conflict(format!(
                "template already exists: {}",
                template.id
            )));
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn find_template(&self, id: &str) -> Result<Option<PromptTemplate>> {
        Ok(self.templates.read().await.get(id).cloned())
    }

    async fn update_template(&self, template: &PromptTemplate) -> Result<()> {
        let mut templates = self.templates.write().await;
        if !templates.contains_key(&template.id) {
            return Err(Error::NotFound {
                entity: "template",
                id: template.id.clone(),
            });
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> Result<()> {
        self.templates
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(Error::NotFound {
                entity: "template",
                id: id.to_string(),
            })
    }

    async fn create_config(&self, config: &PromptConfig) -> Result<()> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.id) {
            return Err(Error::Conflict(format!(
                "config already exists: {}",
                config.id
            )));
        }
        configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn find_config(&self, id: &str) -> Result<Option<PromptConfig>> {
        Ok(self.configs.read().await.get(id).cloned())
    }

    async fn find_configs(&self, filter: &ConfigFilter) -> Result<Vec<PromptConfig>> {
        let mut matched: Vec<PromptConfig> = self
            .configs
            .read()
            .await
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn update_config(&self, config: &PromptConfig) -> Result<()> {
        let mut configs = self.configs.write().await;
        if !configs.contains_key(&config.id) {
            return Err(Error::NotFound {
                entity: "config",
                id: config.id.clone(),
            });
        }
        configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn delete_config(&self, id: &str) -> Result<()> {
        self.configs
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(Error::NotFound {
                entity: "config",
                id: id.to_string(),
            })
    }
}

/// Cache-through store over the repository collaborator
pub struct PromptStore {
    repo: Arc<dyn PromptRepository>,
    templates: RwLock<HashMap<String, Arc<PromptTemplate>>>,
    configs: RwLock<HashMap<String, Arc<PromptConfig>>>,
}

impl PromptStore {
    /// Create a store over a repository
    #[must_use]
    pub fn new(repo: Arc<dyn PromptRepository>) -> Self {
        Self {
            repo,
            templates: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached entity
    pub async fn clear_cache(&self) {
        self.templates.write().await.clear();
        self.configs.write().await.clear();
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Validate and persist a new template
    pub async fn create_template(&self, template: PromptTemplate) -> Result<Arc<PromptTemplate>> {
        template.validate()?;
        self.repo.create_template(&template).await?;
        let template = Arc::new(template);
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template.clone());
        debug!(id = %template.id, name = %template.name, "template created");
        Ok(template)
    }

    /// Cache-through template read
    pub async fn get_template(&self, id: &str) -> Result<Arc<PromptTemplate>> {
        if let Some(cached) = self.templates.read().await.get(id).cloned() {
            return Ok(cached);
        }
        let template = self
            .repo
            .find_template(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: "template",
                id: id.to_string(),
            })?;
        let template = Arc::new(template);
        self.templates
            .write()
            .await
            .insert(id.to_string(), template.clone());
        Ok(template)
    }

    /// Apply a partial update, re-validate the whole template, write
    /// through to the store and then the cache
    pub async fn update_template(
        &self,
        id: &str,
        update: TemplateUpdate,
    ) -> Result<Arc<PromptTemplate>> {
        let mut template = (*self.get_template(id).await?).clone();
        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(text) = update.template {
            template.template = text;
        }
        if let Some(variables) = update.variables {
            template.variables = variables;
        }
        if let Some(category) = update.category {
            template.category = category;
        }
        if let Some(active) = update.active {
            template.active = active;
        }
        template.version += 1;

        template.validate()?;
        self.repo.update_template(&template).await?;
        let template = Arc::new(template);
        self.templates
            .write()
            .await
            .insert(id.to_string(), template.clone());
        Ok(template)
    }

    /// Delete a template; fails with a conflict while any config
    /// references it
    pub async fn delete_template(&self, id: &str) -> Result<()> {
        let referencing = self
            .repo
            .find_configs(&ConfigFilter::referencing(id))
            .await?;
        if !referencing.is_empty() {
            return Err(Error::Conflict(format!(
                "template {id} is referenced by {} config(s)",
                referencing.len()
            )));
        }
        self.repo.delete_template(id).await?;
        self.templates.write().await.remove(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configs
    // ------------------------------------------------------------------

    /// Validate referential integrity and persist a new config
    pub async fn create_config(&self, config: PromptConfig) -> Result<Arc<PromptConfig>> {
        self.check_config_references(&config).await?;

        if config.is_default && config.active {
            let existing = self
                .repo
                .find_configs(&ConfigFilter::feature_default(config.feature))
                .await?;
            if !existing.is_empty() {
                return Err(Error::Conflict(format!(
                    "feature {} already has a default config",
                    config.feature
                )));
            }
        }

        self.repo.create_config(&config).await?;
        let config = Arc::new(config);
        self.configs
            .write()
            .await
            .insert(config.id.clone(), config.clone());
        debug!(id = %config.id, feature = %config.feature, "config created");
        Ok(config)
    }

    /// Cache-through config read
    pub async fn get_config(&self, id: &str) -> Result<Arc<PromptConfig>> {
        if let Some(cached) = self.configs.read().await.get(id).cloned() {
            return Ok(cached);
        }
        let config = self
            .repo
            .find_config(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: "config",
                id: id.to_string(),
            })?;
        let config = Arc::new(config);
        self.configs
            .write()
            .await
            .insert(id.to_string(), config.clone());
        Ok(config)
    }

    /// Apply a partial update, re-check references, write through to the
    /// store and then the cache
    pub async fn update_config(&self, id: &str, update: ConfigUpdate) -> Result<Arc<PromptConfig>> {
        let mut config = (*self.get_config(id).await?).clone();
        if let Some(system) = update.system_template_id {
            config.system_template_id = system;
        }
        if let Some(user) = update.user_template_id {
            config.user_template_id = user;
        }
        if let Some(assistant) = update.assistant_template_id {
            config.assistant_template_id = assistant;
        }
        if let Some(active) = update.active {
            config.active = active;
        }
        if let Some(enabled) = update.cache_enabled {
            config.cache_enabled = enabled;
        }
        if let Some(ttl) = update.cache_ttl_secs {
            config.cache_ttl_secs = ttl;
        }

        self.check_config_references(&config).await?;
        self.write_config(&config).await?;
        Ok(Arc::new(config))
    }

    /// Delete a config; the feature default can never be deleted, so a
    /// feature is never left without one by deletion
    pub async fn delete_config(&self, id: &str) -> Result<()> {
        let config = self.get_config(id).await?;
        if config.is_default {
            return Err(Error::Conflict(format!(
                "config {id} is the default for feature {}",
                config.feature
            )));
        }
        self.repo.delete_config(id).await?;
        self.configs.write().await.remove(id);
        Ok(())
    }

    /// The active default config for a feature.
    ///
    /// When none exists one is synthesized from the built-in fallback
    /// templates and persisted, so callers never see "no default" as
    /// terminal.
    pub async fn default_config_for_feature(&self, feature: Feature) -> Result<Arc<PromptConfig>> {
        let existing = self
            .repo
            .find_configs(&ConfigFilter::feature_default(feature))
            .await?;
        if let Some(config) = existing.into_iter().next() {
            let config = Arc::new(config);
            self.configs
                .write()
                .await
                .insert(config.id.clone(), config.clone());
            return Ok(config);
        }

        info!(%feature, "no default config, synthesizing from fallback templates");
        let (system, user) = fallback_templates(feature);
        let system = self.create_template(system).await?;
        let user = self.create_template(user).await?;
        let config = PromptConfig::new(feature, &system.id, &user.id)
            .as_default()
            .with_caching(DEFAULT_CACHE_TTL_SECS);
        match self.create_config(config).await {
            Ok(config) => Ok(config),
            // Lost a concurrent synthesis race; serve the winner's config.
            Err(Error::Conflict(_)) => {
                let existing = self
                    .repo
                    .find_configs(&ConfigFilter::feature_default(feature))
                    .await?;
                let winner = existing.into_iter().next().ok_or_else(|| {
                    Error::Conflict(format!(
                        "feature {feature} already has a default config"
                    ))
                })?;
                let winner = Arc::new(winner);
                self.configs
                    .write()
                    .await
                    .insert(winner.id.clone(), winner.clone());
                Ok(winner)
            }
            Err(e) => Err(e),
        }
    }

    /// Move the default flag for a feature to `config_id`.
    ///
    /// Two sequential writes: unset the current default, then set the
    /// target. Not atomic; a crash between the writes can transiently
    /// leave the feature with zero or two defaults.
    pub async fn set_default_config_for_feature(
        &self,
        config_id: &str,
        feature: Feature,
    ) -> Result<Arc<PromptConfig>> {
        let target = self.get_config(config_id).await?;
        if target.feature != feature {
            return Err(Error::Conflict(format!(
                "config {config_id} belongs to feature {}, not {feature}",
                target.feature
            )));
        }
        if !target.active {
            return Err(Error::Conflict(format!(
                "config {config_id} is inactive and cannot be the default"
            )));
        }
        if target.is_default {
            return Ok(target);
        }

        let current = self
            .repo
            .find_configs(&ConfigFilter::feature_default(feature))
            .await?;
        for mut previous in current {
            previous.is_default = false;
            self.write_config(&previous).await?;
        }

        let mut target = (*target).clone();
        target.is_default = true;
        self.write_config(&target).await?;
        info!(%feature, config = %target.id, "default config moved");
        Ok(Arc::new(target))
    }

    async fn check_config_references(&self, config: &PromptConfig) -> Result<()> {
        self.get_template(&config.system_template_id).await?;
        self.get_template(&config.user_template_id).await?;
        if let Some(assistant) = &config.assistant_template_id {
            self.get_template(assistant).await?;
        }
        Ok(())
    }

    async fn write_config(&self, config: &PromptConfig) -> Result<()> {
        self.repo.update_config(config).await?;
        self.configs
            .write()
            .await
            .insert(config.id.clone(), Arc::new(config.clone()));
        Ok(())
    }
}
