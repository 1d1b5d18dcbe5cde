//! Mapping of verified claims onto a [`Subject`].

use serde::Deserialize;
use serde_json::Value;

use mechanisms_sdk::{MechanismError, Subject};

/// Path selecting the whole claim set.
const THIS: &str = "@this";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Session {
    /// Dotted path of the claim used as `Subject.ID`.
    pub subject_id_from: String,
    /// Dotted path of the object used as `Subject.Attributes`.
    pub subject_attributes_from: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            subject_id_from: "sub".to_owned(),
            subject_attributes_from: THIS.to_owned(),
        }
    }
}

impl Session {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if either path does not
    /// resolve to a usable value.
    pub fn subject(&self, claims: &Value) -> Result<Subject, MechanismError> {
        let id = match lookup(claims, &self.subject_id_from) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(value @ (Value::Number(_) | Value::Bool(_))) => value.to_string(),
            _ => {
                return Err(MechanismError::Configuration(format!(
                    "could not extract subject identifier using '{}'",
                    self.subject_id_from
                )));
            }
        };

        let attributes = match lookup(claims, &self.subject_attributes_from) {
            Some(Value::Object(map)) => map.clone(),
            _ => {
                return Err(MechanismError::Configuration(format!(
                    "could not extract subject attributes using '{}'",
                    self.subject_attributes_from
                )));
            }
        };

        Ok(Subject::new(id).with_attributes(attributes))
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path == THIS {
        return Some(root);
    }
    path.split('.').try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mechanisms_sdk::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn default_maps_sub_and_whole_claim_set() {
        let claims = json!({"sub": "alice", "iss": "https://idp.local"});
        let subject = Session::default().subject(&claims).unwrap();
        assert_eq!(subject.id, "alice");
        assert_eq!(subject.attributes["iss"], "https://idp.local");
        assert_eq!(subject.attributes["sub"], "alice");
    }

    #[test]
    fn dotted_paths_reach_nested_claims() {
        let session = Session {
            subject_id_from: "identity.ids.0".to_owned(),
            subject_attributes_from: "identity.profile".to_owned(),
        };
        let claims = json!({"identity": {"ids": [42], "profile": {"name": "Alice"}}});

        let subject = session.subject(&claims).unwrap();
        assert_eq!(subject.id, "42");
        assert_eq!(subject.attributes["name"], "Alice");
    }

    #[test]
    fn unresolved_mapping_is_configuration_error() {
        let err = Session::default().subject(&json!({"iss": "x"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let session = Session {
            subject_attributes_from: "sub".to_owned(),
            ..Session::default()
        };
        let err = session.subject(&json!({"sub": "alice"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
