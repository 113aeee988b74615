//! Error types shared across the orchestration engine
//!
//! One taxonomy for every component. Errors propagate to the caller
//! unmodified; the pipeline never retries or swallows them.

use crate::feature::Feature;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown or inactive model/template/config id
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("model", "template", "config")
        entity: &'static str,
        /// The id that failed to resolve
        id: String,
    },

    /// Validation failure; always carries every violation, never just the first
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Delete blocked by a reference, or duplicate-default attempt
    #[error("conflict: {0}")]
    Conflict(String),

    /// No active model satisfies a feature's capability requirement
    #[error("no eligible model for feature: {feature}")]
    NoEligibleModel {
        /// The feature that could not be served
        feature: Feature,
    },

    /// Wrapped failure from the external model provider
    #[error("provider error: {message}")]
    Provider {
        /// HTTP status from the provider, when one was received
        status: Option<u16>,
        /// Original provider message
        message: String,
    },

    /// Configuration error (empty catalog, unknown feature)
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a `Validation` error from a list of violations.
    ///
    /// Callers collect every violation before constructing the error, so an
    /// empty list is a logic bug upstream; it still produces a valid error.
    #[must_use]
    pub fn validation(violations: Vec<String>) -> Self {
        Self::Validation(violations)
    }

    /// Build a provider error without an HTTP status.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            status: None,
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
