//! File-backed freshness cache: one JSON document per key.
//!
//! Each file holds a [`CacheEntry`] envelope with `created_at` stored inline,
//! so freshness never depends on filesystem timestamps.
//!
//! Storage location: `<dir>/<sanitized key>-<key hash>.json` (default dir
//! `data/`). The envelope also records the raw key, and a read whose stored
//! key differs from the requested one is a miss.
//!
//! Writes go to a uniquely named temporary file in the same directory and
//! are then renamed over the target, so concurrent readers see either the
//! old document or the new one, never a partial write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escapist_core::cache::{CacheEntry, CacheStore};
use escapist_core::error::CacheError;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Clock, file_stem, system_clock};

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// On-disk shape, lenient so that a document without `created_at` can be
/// recognised and treated as a miss rather than as corruption.
#[derive(Deserialize)]
struct StoredEntry {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Clock,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
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

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the document for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    /// The stored envelope regardless of freshness.
    ///
    /// `Ok(None)` when the file is missing, carries no creation time, or was
    /// stored under a different key.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Unavailable(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let stored: StoredEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let Some(created_at) = stored.created_at else {
            warn!(key, path = %path.display(), "Cache entry has no creation time, ignoring");
            return Ok(None);
        };

        if stored.key.as_deref() != Some(key) {
            debug!(
                key,
                stored_key = stored.key.as_deref().unwrap_or(""),
                path = %path.display(),
                "Cache document belongs to another key, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(CacheEntry::new(key, stored.payload, created_at)))
    }

    async fn write_atomic(&self, target: &Path, contents: &[u8]) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CacheError::Unavailable(format!(
                "failed to create cache directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, contents).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Unavailable(format!(
                "failed to write {}: {e}",
                tmp.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp, target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Unavailable(format!(
                "failed to publish {}: {e}",
                target.display()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl CacheStore for FileCache {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let Some(entry) = self.entry(key).await? else {
            debug!(key, "Cache miss");
            return Ok(None);
        };

        let now = (self.clock)();
        if entry.is_fresh_at(now, self.ttl) {
            debug!(key, age_secs = entry.age_at(now).as_secs(), "Cache hit");
            Ok(Some(entry.payload))
        } else {
            debug!(key, age_secs = entry.age_at(now).as_secs(), "Cache entry expired");
            Ok(None)
        }
    }

    async fn put(&self, key: &str, payload: serde_json::Value) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, payload, (self.clock)());
        let contents = serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let path = self.path_for(key);
        self.write_atomic(&path, &contents).await?;
        debug!(key, path = %path.display(), "Cache entry stored");
        Ok(())
    }

    async fn age(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(self
            .entry(key)
            .await?
            .map(|entry| entry.age_at((self.clock)())))
    }
}
