#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! TTL cache shared by gatehouse mechanisms.
//!
//! The cache is the only mutable state shared across concurrently evaluated
//! requests. It is owned by the composition root and handed to mechanisms as
//! an explicit `Arc<dyn Cache>` handle.
//!
//! - [`Cache`] - the contract (`get` / `set` / `delete`)
//! - [`MemoryCache`] - process-local implementation with lazy expiry
//! - [`NoopCache`] - stores nothing
//! - [`CacheKeyBuilder`] - deterministic SHA-256 cache keys
//! - [`get_typed`] - shape-checked reads that evict malformed entries

pub mod cache;
pub mod key;
pub mod memory;

pub use cache::{Cache, CacheValue, NoopCache, get_typed};
pub use key::CacheKeyBuilder;
pub use memory::MemoryCache;
