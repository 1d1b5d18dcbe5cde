//! Deterministic cache-key construction.

use sha2::{Digest, Sha256};

/// Builds a cache key as the SHA-256 digest of a sequence of fields.
///
/// Every field is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// produce different keys. The result is 64 lowercase hex characters.
///
/// ```
/// use gatehouse_cache::CacheKeyBuilder;
///
/// let key = CacheKeyBuilder::new()
///     .field(b"authorizer-1")
///     .field_u64(60)
///     .finish();
/// assert_eq!(key.len(), 64);
/// ```
#[derive(Clone, Default)]
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    #[must_use]
    pub fn field_u64(self, value: u64) -> Self {
        self.field(value.to_le_bytes())
    }

    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
