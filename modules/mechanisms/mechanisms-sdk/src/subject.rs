//! Identity record produced by authenticators.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Verified identity plus attributes accumulated along the pipeline.
///
/// Authenticators create it; authorizers insert attributes keyed by their
/// mechanism id. Field names serialize as `ID` / `Attributes` so templates and
/// expressions address them as `Subject.ID` and `Subject.Attributes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: Map<String, Value>,
}

impl Subject {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Content fingerprint used in cache keys.
    ///
    /// Attribute keys are hashed in sorted order so the fingerprint does not
    /// depend on insertion order.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.id.len() as u64).to_le_bytes());
        hasher.update(self.id.as_bytes());

        let mut keys: Vec<&String> = self.attributes.keys().collect();
        keys.sort();
        for key in keys {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            let value = serde_json::to_vec(&self.attributes[key.as_str()]).unwrap_or_default();
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(&value);
        }

        hasher.finalize().into()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_for_equal_subjects() {
        let a = Subject::new("alice");
        let b = Subject::new("alice");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_id_and_attributes() {
        let base = Subject::new("alice");
        let other_id = Subject::new("bob");

        let mut with_attr = Subject::new("alice");
        with_attr
            .attributes
            .insert("group".to_owned(), json!("admins"));

        assert_ne!(base.hash(), other_id.hash());
        assert_ne!(base.hash(), with_attr.hash());
    }

    #[test]
    fn serializes_with_template_field_names() {
        let subject = Subject::new("alice");
        let value = serde_json::to_value(&subject).unwrap();
        assert_eq!(value, json!({"ID": "alice", "Attributes": {}}));
    }
}
