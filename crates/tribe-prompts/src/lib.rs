//! Prompt template management and rendering for the Tribe AI engine.
//!
//! Templates declare a variable schema that must biject with the
//! placeholders in their text. Configs bundle templates per feature, with
//! exactly one active default per feature in steady state. Rendering is
//! pure and all-or-nothing over a nested variable graph.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtin;
pub mod render;
pub mod store;
pub mod template;

pub use builtin::fallback_templates;
pub use render::{
    estimate_token_count, optimize_prompt_for_feature, render, render_prompt, validate_variables,
    RenderedPrompt,
};
pub use store::{
    ConfigFilter, ConfigUpdate, MemoryRepository, PromptConfig, PromptRepository, PromptStore,
    TemplateUpdate, DEFAULT_CACHE_TTL_SECS,
};
pub use template::{
    extract_placeholders, extract_variables, PromptCategory, PromptTemplate, PromptVariable,
    VariableType,
};
