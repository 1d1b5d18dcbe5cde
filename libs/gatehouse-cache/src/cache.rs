//! Cache contract.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Opaque cached value.
///
/// The cache never inspects values; readers downcast and must treat a value
/// of the wrong type as absent (see [`get_typed`]).
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// TTL key/value store shared across concurrent callers.
///
/// No enumeration and no multi-key atomicity. Concurrent writers to the same
/// key follow "last write wins". Calls are expected to be fast and are not
/// cancellable.
pub trait Cache: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Stores `value` under `key` for `ttl`. A zero `ttl` stores nothing.
    fn set(&self, key: &str, value: CacheValue, ttl: Duration);

    /// Removes the entry stored under `key`, if any.
    fn delete(&self, key: &str);
}

/// Reads `key` and downcasts the hit to `T`.
///
/// A hit holding some other type is logged, evicted and reported as a miss so
/// the caller recomputes the value instead of failing.
pub fn get_typed<T>(cache: &dyn Cache, key: &str) -> Option<Arc<T>>
where
    T: Any + Send + Sync,
{
    let value = cache.get(key)?;

    match value.downcast::<T>() {
        Ok(typed) => Some(typed),
        Err(_) => {
            tracing::warn!(
                cache_key = key,
                expected = std::any::type_name::<T>(),
                "Wrong object type from cache, evicting entry"
            );
            cache.delete(key);
            None
        }
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _key: &str) -> Option<CacheValue> {
        None
    }

    fn set(&self, _key: &str, _value: CacheValue, _ttl: Duration) {}

    fn delete(&self, _key: &str) {}
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::MemoryCache;
    use tracing_test::traced_test;

    #[test]
    fn get_typed_returns_matching_value() {
        let cache = MemoryCache::new();
        cache.set("k", Arc::new(42_u64), Duration::from_secs(60));

        let hit = get_typed::<u64>(&cache, "k");
        assert_eq!(hit.as_deref(), Some(&42));
    }

    #[test]
    #[traced_test]
    fn get_typed_evicts_wrong_shape() {
        let cache = MemoryCache::new();
        cache.set("k", Arc::new("not a number"), Duration::from_secs(60));

        assert!(get_typed::<u64>(&cache, "k").is_none());
        assert!(cache.get("k").is_none(), "wrong-shape entry must be evicted");
        assert!(logs_contain("Wrong object type from cache"));
    }

    #[test]
    fn get_typed_miss_is_none() {
        let cache = MemoryCache::new();
        assert!(get_typed::<u64>(&cache, "absent").is_none());
    }

    #[test]
    fn noop_cache_never_returns_values() {
        let cache = NoopCache;
        cache.set("k", Arc::new(1_u8), Duration::from_secs(60));
        assert!(cache.get("k").is_none());
    }
}
