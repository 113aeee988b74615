//! Tribe LLM - Model catalog, selection, and provider access
//!
//! This crate provides the model side of the orchestration engine:
//! - Provider: the contract consumed from external model providers, plus
//!   the OpenRouter implementation and a scripted mock
//! - Model: catalog entries and generation-parameter validation/merging
//! - Registry: the atomically-swapped catalog snapshot and the
//!   capability-based selector with deterministic fallback

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod openrouter;
pub mod provider;
pub mod registry;

pub use model::{Model, ModelParameters};
pub use openrouter::{OpenRouterClient, OpenRouterConfig};
pub use provider::{
    ChatCompletion, Message, MessageRole, ProviderClient, TextGeneration, Usage,
};
pub use registry::ModelRegistry;
