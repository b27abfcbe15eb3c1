//! Freshness cache backends for Escapist.

pub mod file;
pub mod in_memory;

pub use file::FileCache;
pub use in_memory::InMemoryCache;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Source of "now" for freshness checks. Swappable so tests can age entries.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub(crate) fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Turn a free-form key into a safe file stem.
///
/// Lowercases, keeps ASCII alphanumerics plus `-`, `_` and `.`, collapses
/// every other run of characters into a single `_`, and trims leading and
/// trailing `_` (and leading `.`, so a key can never name a hidden file or a
/// parent directory).
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;

    for c in key.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            if pending_sep {
                out.push('_');
                pending_sep = false;
            }
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    let trimmed = out
        .trim_start_matches(['_', '.'])
        .trim_end_matches('_');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File stem for `key`: the readable [`sanitize_key`] form plus the first
/// 16 hex digits of the SHA-256 of the raw key, so distinct keys never share
/// a document.
pub fn file_stem(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let suffix: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{suffix}", sanitize_key(key))
}
