//! Response cache
//!
//! Keyed by feature plus a digest of the typed input; TTL comes from the
//! config that served the request. Expired entries are dropped on probe.
//! Concurrent populates for the same key are benign: values are immutable
//! and the last writer wins.

use crate::request::OrchestrationResponse;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use tribe_core::{Error, Feature, FeatureInput, Result};

struct CacheEntry {
    response: OrchestrationResponse,
    expires_at: Instant,
}

/// TTL cache for completed orchestration responses
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic cache key: feature tag plus a digest of the input
    pub fn key(feature: Feature, input: &FeatureInput) -> Result<String> {
        let bytes = serde_json::to_vec(input)
            .map_err(|e| Error::Config(format!("input is not serializable: {e}")))?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("{feature}:{digest:x}"))
    }

    /// Probe the cache; expired entries are removed, not returned
    pub async fn get(&self, key: &str) -> Option<OrchestrationResponse> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    debug!(key, "response cache hit");
                    return Some(entry.response.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().await.remove(key);
        }
        None
    }

    /// Store a response for `ttl`
    pub async fn put(&self, key: String, response: OrchestrationResponse, ttl: Duration) {
        let entry = CacheEntry {
            response,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
