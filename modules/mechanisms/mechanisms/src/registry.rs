//! Construction of mechanism prototypes from the global catalogue.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use gatehouse_cache::Cache;
use mechanisms_sdk::{Authenticator, Authorizer, MechanismError};

use crate::authenticators::{ANONYMOUS, AnonymousAuthenticator, JWT, JwtAuthenticator};
use crate::authorizers::{
    ALLOW, AllowAuthorizer, CEL, CelAuthorizer, DENY, DenyAuthorizer, REMOTE, RemoteAuthorizer,
};
use crate::config::{MechanismConfig, MechanismRef, MechanismsConfig};
use crate::contenttype::DecoderRegistry;
use crate::pipeline::Pipeline;

/// Long-lived collaborators handed to every mechanism constructor.
#[derive(Clone)]
pub struct MechanismDeps {
    pub cache: Arc<dyn Cache>,
    pub http: reqwest::Client,
    pub decoders: Arc<DecoderRegistry>,
}

impl MechanismDeps {
    /// Default HTTP client and the default decoder set.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            http: reqwest::Client::new(),
            decoders: Arc::new(DecoderRegistry::default()),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }
}

impl fmt::Debug for MechanismDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismDeps").finish_non_exhaustive()
    }
}

/// Constructor `(id, raw config, deps) -> prototype`.
type Factory<T> = fn(&str, Option<&Value>, &MechanismDeps) -> Result<Arc<T>, MechanismError>;
type AuthenticatorFactory = Factory<dyn Authenticator>;
type AuthorizerFactory = Factory<dyn Authorizer>;

/// Kind name to constructor tables. The set of kinds is fixed.
struct MechanismRegistry {
    authenticators: HashMap<&'static str, AuthenticatorFactory>,
    authorizers: HashMap<&'static str, AuthorizerFactory>,
}

impl MechanismRegistry {
    fn builtin() -> Self {
        let mut authenticators: HashMap<&'static str, AuthenticatorFactory> = HashMap::new();
        authenticators.insert(JWT, |id, config, deps| {
            Ok(Arc::new(JwtAuthenticator::new(id, config, deps)?))
        });
        authenticators.insert(ANONYMOUS, |id, config, _| {
            Ok(Arc::new(AnonymousAuthenticator::new(id, config)?))
        });

        let mut authorizers: HashMap<&'static str, AuthorizerFactory> = HashMap::new();
        authorizers.insert(REMOTE, |id, config, deps| {
            Ok(Arc::new(RemoteAuthorizer::new(id, config, deps)?))
        });
        authorizers.insert(CEL, |id, config, _| Ok(Arc::new(CelAuthorizer::new(id, config)?)));
        authorizers.insert(ALLOW, |id, config, _| Ok(Arc::new(AllowAuthorizer::new(id, config)?)));
        authorizers.insert(DENY, |id, config, _| Ok(Arc::new(DenyAuthorizer::new(id, config)?)));

        Self {
            authenticators,
            authorizers,
        }
    }
}

fn build_all<T: ?Sized>(
    role: &str,
    entries: &[MechanismConfig],
    factories: &HashMap<&'static str, Factory<T>>,
    deps: &MechanismDeps,
) -> Result<HashMap<String, Arc<T>>, MechanismError> {
    let mut built = HashMap::with_capacity(entries.len());

    for entry in entries {
        let factory = factories.get(entry.kind.as_str()).ok_or_else(|| {
            MechanismError::Configuration(format!(
                "unsupported {role} type '{}' for mechanism '{}'",
                entry.kind, entry.id
            ))
        })?;
        if built.contains_key(&entry.id) {
            return Err(MechanismError::Configuration(format!(
                "duplicate {role} id '{}'",
                entry.id
            )));
        }

        let prototype = factory(&entry.id, entry.config.as_ref(), deps)?;
        tracing::debug!(mechanism_id = %entry.id, kind = %entry.kind, "Built {role} prototype");
        built.insert(entry.id.clone(), prototype);
    }

    Ok(built)
}

/// Immutable prototypes keyed by mechanism id, shared by every rule.
#[derive(Clone, Default)]
pub struct Prototypes {
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
}

impl Prototypes {
    /// Builds one prototype per catalogue entry.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] for an unknown kind, a
    /// duplicate id, or a mechanism whose config is rejected.
    pub fn build(config: &MechanismsConfig, deps: &MechanismDeps) -> Result<Self, MechanismError> {
        let registry = MechanismRegistry::builtin();

        let prototypes = Self {
            authenticators: build_all("authenticator", &config.authenticators, &registry.authenticators, deps)?,
            authorizers: build_all("authorizer", &config.authorizers, &registry.authorizers, deps)?,
        };
        tracing::info!(
            authenticators = prototypes.authenticators.len(),
            authorizers = prototypes.authorizers.len(),
            "Mechanism prototypes built"
        );
        Ok(prototypes)
    }

    #[must_use]
    pub fn authenticator(&self, id: &str) -> Option<&Arc<dyn Authenticator>> {
        self.authenticators.get(id)
    }

    #[must_use]
    pub fn authorizer(&self, id: &str) -> Option<&Arc<dyn Authorizer>> {
        self.authorizers.get(id)
    }

    /// Rule-scoped authenticator for `reference`.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if the id is unknown or the
    /// override is rejected.
    pub fn derive_authenticator(&self, reference: &MechanismRef) -> Result<Arc<dyn Authenticator>, MechanismError> {
        let prototype = self.authenticator(&reference.id).ok_or_else(|| unknown("authenticator", &reference.id))?;
        Arc::clone(prototype).with_config(reference.config.as_ref())
    }

    /// Rule-scoped authorizer for `reference`.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if the id is unknown or the
    /// override is rejected.
    pub fn derive_authorizer(&self, reference: &MechanismRef) -> Result<Arc<dyn Authorizer>, MechanismError> {
        let prototype = self.authorizer(&reference.id).ok_or_else(|| unknown("authorizer", &reference.id))?;
        Arc::clone(prototype).with_config(reference.config.as_ref())
    }

    /// Resolves a rule's mechanism references into a pipeline.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if no authenticator is
    /// referenced or any reference cannot be derived.
    pub fn pipeline(
        &self,
        authenticators: &[MechanismRef],
        authorizers: &[MechanismRef],
    ) -> Result<Pipeline, MechanismError> {
        if authenticators.is_empty() {
            return Err(MechanismError::Configuration(
                "a pipeline requires at least one authenticator".to_owned(),
            ));
        }

        let authenticators = authenticators
            .iter()
            .map(|reference| self.derive_authenticator(reference))
            .collect::<Result<Vec<_>, _>>()?;
        let authorizers = authorizers
            .iter()
            .map(|reference| self.derive_authorizer(reference))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline::new(authenticators, authorizers))
    }
}

fn unknown(role: &str, id: &str) -> MechanismError {
    MechanismError::Configuration(format!("no {role} prototype with id '{id}'"))
}

impl fmt::Debug for Prototypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut authenticators: Vec<&str> = self.authenticators.keys().map(String::as_str).collect();
        let mut authorizers: Vec<&str> = self.authorizers.keys().map(String::as_str).collect();
        authenticators.sort_unstable();
        authorizers.sort_unstable();

        f.debug_struct("Prototypes")
            .field("authenticators", &authenticators)
            .field("authorizers", &authorizers)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use gatehouse_cache::NoopCache;
    use mechanisms_sdk::ErrorKind;
    use serde_json::json;

    use super::*;

    fn deps() -> MechanismDeps {
        MechanismDeps::new(Arc::new(NoopCache))
    }

    fn catalogue(value: Value) -> MechanismsConfig {
        MechanismsConfig::from_value(value).unwrap()
    }

    #[test]
    fn builds_every_builtin_kind() {
        let config = catalogue(json!({
            "authenticators": [
                {"id": "anon", "type": "anonymous"},
                {"id": "jwt", "type": "jwt", "config": {"jwks_endpoint": {"url": "http://idp.local/jwks"}}}
            ],
            "authorizers": [
                {"id": "allow", "type": "allow"},
                {"id": "deny", "type": "deny"},
                {"id": "local", "type": "cel", "config": {"expressions": [{"expression": "true"}]}},
                {"id": "pdp", "type": "remote", "config": {
                    "endpoint": {"url": "http://pdp.local", "headers": {"X-User": "{{ Subject.ID }}"}}
                }}
            ]
        }));

        let prototypes = Prototypes::build(&config, &deps()).unwrap();
        for id in ["anon", "jwt"] {
            assert_eq!(prototypes.authenticator(id).unwrap().id(), id);
        }
        for id in ["allow", "deny", "local", "pdp"] {
            assert_eq!(prototypes.authorizer(id).unwrap().id(), id);
        }
    }

    #[test]
    fn unknown_kind_and_duplicate_id_are_rejected() {
        let err = Prototypes::build(
            &catalogue(json!({"authenticators": [{"id": "x", "type": "oauth2_introspection"}]})),
            &deps(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Prototypes::build(
            &catalogue(json!({"authenticators": [
                {"id": "anon", "type": "anonymous"},
                {"id": "anon", "type": "anonymous"}
            ]})),
            &deps(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate authenticator id 'anon'"));
    }

    #[test]
    fn authenticator_kinds_are_not_authorizer_kinds() {
        let err = Prototypes::build(
            &catalogue(json!({"authorizers": [{"id": "anon", "type": "anonymous"}]})),
            &deps(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn derive_without_override_returns_prototype() {
        let prototypes = Prototypes::build(
            &catalogue(json!({"authenticators": [{"id": "anon", "type": "anonymous"}]})),
            &deps(),
        )
        .unwrap();

        let derived = prototypes.derive_authenticator(&MechanismRef::new("anon")).unwrap();
        assert!(Arc::ptr_eq(&derived, prototypes.authenticator("anon").unwrap()));

        let err = prototypes.derive_authenticator(&MechanismRef::new("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn pipeline_requires_an_authenticator() {
        let prototypes = Prototypes::build(
            &catalogue(json!({"authorizers": [{"id": "allow", "type": "allow"}]})),
            &deps(),
        )
        .unwrap();

        let err = prototypes.pipeline(&[], &[MechanismRef::new("allow")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
