//! Process-local cache backed by a concurrent hash map.

use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{Cache, CacheValue};

struct Entry {
    value: CacheValue,
    expires_at: Instant,
}

/// In-memory [`Cache`] with lazy expiry.
///
/// Expired entries are dropped when read. [`MemoryCache::purge_expired`] (or
/// the janitor task from [`MemoryCache::spawn_janitor`]) reclaims entries that
/// are never read again.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Spawns a task that purges expired entries every `interval` until
    /// `cancel` fires.
    pub fn spawn_janitor(
        self: &std::sync::Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
        })
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(std::sync::Arc::clone(&entry.value));
            }
        }
        // Guard dropped above; removing while holding it would deadlock the shard.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            tracing::warn!(cache_key = key, ttl_secs = ttl.as_secs(), "Cache TTL out of range, entry not stored");
            return;
        };
        self.entries
            .insert(key.to_owned(), Entry { value, expires_at });
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}
