//! Key lookup in a fetched key set.

use jsonwebtoken::jwk::{Jwk, JwkSet};

use mechanisms_sdk::MechanismError;

/// Resolves the single key matching the token's key-id hints.
///
/// A hint of `None` matches keys without a `kid`. All candidates across all
/// distinct hints are collected and exactly one must remain; duplicate key ids
/// are rejected even when each key is valid on its own.
pub fn resolve<'a>(jwks: &'a JwkSet, hints: &[Option<&str>]) -> Result<&'a Jwk, MechanismError> {
    let mut distinct: Vec<Option<&str>> = Vec::with_capacity(hints.len());
    for hint in hints {
        if !distinct.contains(hint) {
            distinct.push(*hint);
        }
    }

    let mut candidates = jwks
        .keys
        .iter()
        .filter(|key| distinct.contains(&key.common.key_id.as_deref()));

    match (candidates.next(), candidates.next()) {
        (Some(key), None) => Ok(key),
        (None, _) => Err(MechanismError::KeyResolution(format!(
            "no key found for key id {}",
            describe(&distinct)
        ))),
        (Some(_), Some(_)) => Err(MechanismError::KeyResolution(format!(
            "no unique key found for key id {}",
            describe(&distinct)
        ))),
    }
}

/// JWA name of the key's algorithm, e.g. `RS256`.
#[must_use]
pub fn algorithm_name(key: &Jwk) -> Option<String> {
    let alg = key.common.key_algorithm.as_ref()?;
    match serde_json::to_value(alg).ok()? {
        serde_json::Value::String(name) => Some(name),
        _ => None,
    }
}

fn describe(hints: &[Option<&str>]) -> String {
    hints
        .iter()
        .map(|hint| format!("'{}'", hint.unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mechanisms_sdk::ErrorKind;
    use serde_json::json;

    use super::*;

    fn key_set(kids: &[Option<&str>]) -> JwkSet {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| {
                let mut key = json!({"kty": "oct", "alg": "HS256", "k": "c2VjcmV0"});
                if let Some(kid) = kid {
                    key["kid"] = json!(kid);
                }
                key
            })
            .collect();
        serde_json::from_value(json!({"keys": keys})).unwrap()
    }

    #[test]
    fn resolves_unique_key() {
        let jwks = key_set(&[Some("a"), Some("b")]);
        let key = resolve(&jwks, &[Some("b")]).unwrap();
        assert_eq!(key.common.key_id.as_deref(), Some("b"));
        assert_eq!(algorithm_name(key).as_deref(), Some("HS256"));
    }

    #[test]
    fn duplicate_key_ids_are_ambiguous() {
        let jwks = key_set(&[Some("a"), Some("a")]);
        let err = resolve(&jwks, &[Some("a")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyResolution);
        assert!(err.to_string().contains("no unique key"));
    }

    #[test]
    fn matches_across_hints_are_ambiguous() {
        let jwks = key_set(&[Some("a"), Some("b")]);
        let err = resolve(&jwks, &[Some("a"), Some("b")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyResolution);
    }

    #[test]
    fn unknown_key_id_fails() {
        let jwks = key_set(&[Some("a")]);
        let err = resolve(&jwks, &[Some("z")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyResolution);
    }

    #[test]
    fn missing_kid_matches_keys_without_kid() {
        let jwks = key_set(&[None, Some("a")]);
        let key = resolve(&jwks, &[None]).unwrap();
        assert!(key.common.key_id.is_none());
    }
}
