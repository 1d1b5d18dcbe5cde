//! Static values exposed to templates as `Values`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gatehouse_cache::CacheKeyBuilder;

/// Named string values configured on a mechanism.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(BTreeMap<String, String>);

impl Values {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `self` overlaid with `other`; keys present in both take
    /// `other`'s value.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(merged)
    }

    /// Content fingerprint, independent of insertion order.
    #[must_use]
    pub fn hash(&self) -> String {
        self.0
            .iter()
            .fold(CacheKeyBuilder::new(), |builder, (k, v)| builder.field(k).field(v))
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Values
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn merge_overrides_and_keeps_the_rest() {
        let base: Values = [("a", "1"), ("b", "2")].into_iter().collect();
        let overrides: Values = [("b", "20"), ("c", "30")].into_iter().collect();

        let merged = base.merge(&overrides);
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("20"));
        assert_eq!(merged.get("c"), Some("30"));
        assert_eq!(base.get("b"), Some("2"), "merge must not touch the receiver");
    }

    #[test]
    fn hash_tracks_content() {
        let a: Values = [("k", "v")].into_iter().collect();
        let b: Values = [("k", "w")].into_iter().collect();
        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), b.hash());
    }
}
