//! Bounded least-recently-used memo of model answers, keyed by prompt hash.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use sha2::{Digest, Sha256};

/// Compute a prompt hash for cache keying.
///
/// Byte-identical prompts hash equal; any difference yields a different key.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// LRU cache of completion text. A capacity of zero disables caching.
///
/// Eviction runs as moka maintenance, so the entry count may briefly
/// exceed the capacity until pending tasks are processed.
#[derive(Clone)]
pub struct PromptCache {
    inner: Option<Cache<String, String>>,
}

impl PromptCache {
    pub fn new(capacity: usize) -> Self {
        let inner = (capacity > 0).then(|| {
            Cache::builder()
                .max_capacity(capacity as u64)
                .eviction_policy(EvictionPolicy::lru())
                .build()
        });
        Self { inner }
    }

    /// Look up a prompt and mark it as most recently used.
    pub async fn get(&self, prompt: &str) -> Option<String> {
        let cache = self.inner.as_ref()?;
        cache.get(&prompt_hash(prompt)).await
    }

    /// Store the answer for a prompt.
    pub async fn insert(&self, prompt: &str, text: String) {
        if let Some(cache) = &self.inner {
            cache.insert(prompt_hash(prompt), text).await;
        }
    }

    /// Apply pending evictions and recency updates.
    pub async fn run_pending_tasks(&self) {
        if let Some(cache) = &self.inner {
            cache.run_pending_tasks().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |cache| cache.entry_count() as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
