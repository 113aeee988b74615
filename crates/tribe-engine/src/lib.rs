//! Tribe Engine - the AI orchestration pipeline
//!
//! Ties the other crates together: a request comes in as a typed feature
//! input, a prompt config and model are resolved, prompts are rendered,
//! one provider call is made, and the payload is mapped to a structured
//! per-feature result. Completed responses are cached per config TTL.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod pipeline;
pub mod request;

pub use cache::ResponseCache;
pub use pipeline::Orchestrator;
pub use request::{
    FeatureResult, OrchestrationRequest, OrchestrationResponse, Overrides, RequestStatus,
};
