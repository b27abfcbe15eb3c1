//! Freshness cache trait — TTL-bounded JSON storage keyed by name.
//!
//! Entries are never deleted. A read simply ignores an entry whose age has
//! reached the TTL, and the next `put` for the same key overwrites it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheError;

/// One cached payload together with the moment it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: serde_json::Value, created_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at,
        }
    }

    /// Elapsed time since creation. An entry stamped in the future is age 0.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fresh while `now - created_at < ttl`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_at(now) < ttl
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "file").
    fn name(&self) -> &str;

    /// The stored payload, only if the entry exists and is still fresh.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Store `payload` stamped with the current time, replacing any prior entry.
    async fn put(&self, key: &str, payload: serde_json::Value) -> Result<(), CacheError>;

    /// Time since the entry was created; `None` when unknown.
    async fn age(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}
