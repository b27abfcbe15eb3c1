//! In-memory cache, for tests and one-shot runs that should not touch disk.

use async_trait::async_trait;
use escapist_core::cache::{CacheEntry, CacheStore};
use escapist_core::error::CacheError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::file::DEFAULT_TTL;
use crate::{Clock, system_clock};

pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    clock: Clock,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: DEFAULT_TTL,
            clock: system_clock(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Seed an entry with an explicit creation time.
    pub async fn insert(&self, entry: CacheEntry) {
        self.entries.write().await.insert(entry.key.clone(), entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let now = (self.clock)();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_fresh_at(now, self.ttl))
            .map(|e| e.payload.clone()))
    }

    async fn put(&self, key: &str, payload: serde_json::Value) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, payload, (self.clock)());
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn age(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = (self.clock)();
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|e| e.age_at(now)))
    }
}
