//! Tribe Core - Shared vocabulary for the AI orchestration engine
//!
//! This crate provides the types every other engine crate speaks:
//! - Error: the single error taxonomy that propagates unmodified to callers
//! - Feature/Capability: the platform's AI use cases and model abilities
//! - FeatureInput: strongly-typed per-feature request payloads

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod feature;
pub mod input;

pub use error::{Error, Result};
pub use feature::{Capability, Feature};
pub use input::{ChatTurn, FeatureInput};
