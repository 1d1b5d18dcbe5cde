//! JWT authenticator.
//!
//! Per call: fetch the key set, extract the token, classify it by its
//! separator count, resolve exactly one key, enforce the algorithm allow-list,
//! verify the signature and claim assertions, then map the claims onto a
//! [`Subject`].

pub mod assertions;
mod keys;
mod nested;
pub mod session;

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use serde_json::Value;

use mechanisms_sdk::{Authenticator, MechanismError, RequestContext, Subject, is_empty_config};

pub use assertions::{Assertions, AssertionsOverride};
pub use session::Session;

use super::JWT;
use crate::config::decode;
use crate::endpoint::Endpoint;
use crate::extractors::{AuthDataExtractStrategy, ExtractorConfig, strategy_from_config};
use crate::registry::MechanismDeps;

const ACCEPT_TYPE: &str = "Accept-Type";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JwtAuthenticatorConfig {
    jwks_endpoint: Endpoint,
    #[serde(default)]
    assertions: Assertions,
    #[serde(default)]
    session: Session,
    #[serde(default)]
    jwt_source: Vec<ExtractorConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct JwtAuthenticatorOverrides {
    assertions: Option<AssertionsOverride>,
}

/// Verifies signed or nested JWTs against a remote key set.
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    id: String,
    endpoint: Arc<Endpoint>,
    assertions: Assertions,
    session: Arc<Session>,
    source: Arc<dyn AuthDataExtractStrategy>,
    http: reqwest::Client,
}

fn default_source() -> Vec<ExtractorConfig> {
    vec![
        ExtractorConfig::header("Authorization", Some("Bearer ")),
        ExtractorConfig::query_parameter("access_token"),
    ]
}

impl JwtAuthenticator {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] for a malformed config or key
    /// set endpoint.
    pub fn new(id: &str, config: Option<&Value>, deps: &MechanismDeps) -> Result<Self, MechanismError> {
        let cfg: JwtAuthenticatorConfig = decode(JWT, id, config)?;

        let mut endpoint = cfg.jwks_endpoint;
        endpoint.validate()?;
        if !endpoint.has_header(ACCEPT_TYPE) {
            endpoint
                .headers
                .insert(ACCEPT_TYPE.to_owned(), mime::APPLICATION_JSON.essence_str().to_owned());
        }

        let sources = if cfg.jwt_source.is_empty() {
            default_source()
        } else {
            cfg.jwt_source
        };

        Ok(Self {
            id: id.to_owned(),
            endpoint: Arc::new(endpoint),
            assertions: cfg.assertions,
            session: Arc::new(cfg.session),
            source: strategy_from_config(&sources),
            http: deps.http.clone(),
        })
    }

    #[must_use]
    pub fn assertions(&self) -> &Assertions {
        &self.assertions
    }

    async fn fetch_key_set(&self) -> Result<JwkSet, MechanismError> {
        let response = self.endpoint.send::<Value>(&self.http, None, None).await?;
        if !response.status.is_success() {
            return Err(MechanismError::Communication(format!(
                "unexpected response code {} from key set endpoint",
                response.status.as_u16()
            )));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| MechanismError::Communication(format!("failed to decode key set: {e}")))
    }

    /// Verifies `token` and returns its claims.
    fn verify(&self, token: &str, jwks: &JwkSet) -> Result<Value, MechanismError> {
        let signed = match token.matches('.').count() {
            2 => Cow::Borrowed(token),
            3 => Cow::Owned(nested::decrypt(token, jwks)?),
            _ => return Err(MechanismError::InvalidFormat("invalid jwt format".to_owned())),
        };

        let header = jsonwebtoken::decode_header(&*signed)
            .map_err(|e| MechanismError::InvalidFormat(format!("failed to parse token header: {e}")))?;
        let key = keys::resolve(jwks, &[header.kid.as_deref()])?;

        let alg_name = keys::algorithm_name(key).unwrap_or_default();
        if !self.assertions.is_algorithm_allowed(&alg_name) {
            return Err(MechanismError::AlgorithmNotAllowed(alg_name));
        }
        let alg = Algorithm::from_str(&alg_name)
            .map_err(|_| MechanismError::AlgorithmNotAllowed(alg_name.clone()))?;

        let decoding_key = DecodingKey::from_jwk(key)
            .map_err(|e| MechanismError::KeyResolution(format!("unusable verification key: {e}")))?;
        let data = jsonwebtoken::decode::<Value>(&*signed, &decoding_key, &self.assertions.validation(alg))
            .map_err(|e| classify(&e))?;

        Ok(data.claims)
    }

    async fn authenticate(&self, ctx: &RequestContext) -> Result<Subject, MechanismError> {
        let jwks = ctx.bounded("key set fetch", self.fetch_key_set()).await?;
        let token = self.source.get_auth_data(ctx.request())?;
        let claims = self.verify(&token, &jwks)?;
        self.session.subject(&claims)
    }
}

fn classify(err: &jsonwebtoken::errors::Error) -> MechanismError {
    use jsonwebtoken::errors::ErrorKind as Jwt;

    match err.kind() {
        Jwt::ExpiredSignature
        | Jwt::ImmatureSignature
        | Jwt::InvalidIssuer
        | Jwt::InvalidAudience
        | Jwt::MissingRequiredClaim(_) => MechanismError::Assertion(err.to_string()),
        Jwt::InvalidSignature => MechanismError::Verification(err.to_string()),
        Jwt::InvalidAlgorithm => MechanismError::AlgorithmNotAllowed(err.to_string()),
        Jwt::InvalidEcdsaKey | Jwt::InvalidRsaKey(_) | Jwt::InvalidKeyFormat => {
            MechanismError::KeyResolution(err.to_string())
        }
        _ => MechanismError::InvalidFormat(err.to_string()),
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn id(&self) -> &str {
        &self.id
    }

    #[tracing::instrument(skip_all, fields(mechanism_id = %self.id))]
    async fn execute(&self, ctx: &RequestContext) -> Result<Subject, MechanismError> {
        tracing::debug!("Authenticating using JWT authenticator");
        self.authenticate(ctx)
            .await
            .map_err(|e| e.with_mechanism(&self.id))
    }

    fn with_config(
        self: Arc<Self>,
        config: Option<&Value>,
    ) -> Result<Arc<dyn Authenticator>, MechanismError> {
        if is_empty_config(config) {
            return Ok(self);
        }

        let overrides: JwtAuthenticatorOverrides = decode(JWT, &self.id, config)?;
        let assertions = match overrides.assertions {
            Some(partial) => self.assertions.merge(partial),
            None => self.assertions.clone(),
        };

        Ok(Arc::new(Self {
            assertions,
            ..(*self).clone()
        }))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use gatehouse_cache::NoopCache;
    use mechanisms_sdk::ErrorKind;
    use serde_json::json;

    use super::*;

    fn deps() -> MechanismDeps {
        MechanismDeps::new(Arc::new(NoopCache))
    }

    fn authenticator(config: Value) -> JwtAuthenticator {
        JwtAuthenticator::new("jwt", Some(&config), &deps()).unwrap()
    }

    fn hs256_key_set(kid: &str) -> JwkSet {
        serde_json::from_value(json!({"keys": [{
            "kty": "oct", "kid": kid, "alg": "HS256", "k": "c2VjcmV0LWtleS1mb3ItdGVzdHM"
        }]}))
        .unwrap()
    }

    #[test]
    fn accept_type_header_is_added_to_key_set_endpoint() {
        let auth = authenticator(json!({"jwks_endpoint": {"url": "http://idp.local/jwks"}}));
        assert_eq!(
            auth.endpoint.headers.get(ACCEPT_TYPE).map(String::as_str),
            Some("application/json")
        );
        assert_eq!(auth.endpoint.method, "GET");
    }

    #[test]
    fn configured_accept_type_is_kept() {
        let auth = authenticator(json!({"jwks_endpoint": {
            "url": "http://idp.local/jwks",
            "headers": {"accept-type": "application/jwk-set+json"}
        }}));
        assert_eq!(auth.endpoint.headers.len(), 1);
    }

    #[test]
    fn missing_endpoint_is_configuration_error() {
        let err = JwtAuthenticator::new("jwt", Some(&json!({})), &deps()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn separator_count_other_than_two_or_three_is_invalid_format() {
        let auth = authenticator(json!({"jwks_endpoint": {"url": "http://idp.local/jwks"}}));
        let jwks = hs256_key_set("k1");

        for token in ["", "abc", "a.b", "a.b.c.d.e", "...."] {
            let err = auth.verify(token, &jwks).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat, "token {token:?}");
        }
    }

    #[test]
    fn disallowed_key_algorithm_fails_before_signature_check() {
        let auth = authenticator(json!({"jwks_endpoint": {"url": "http://idp.local/jwks"}}));
        // header {"alg":"HS256","kid":"k1"}, garbage signature
        let token = "eyJhbGciOiJIUzI1NiIsImtpZCI6ImsxIn0.e30.c2ln";
        let err = auth.verify(token, &hs256_key_set("k1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlgorithmNotAllowed);
    }

    #[test]
    fn override_merges_assertions_without_touching_prototype() {
        let prototype = Arc::new(authenticator(json!({
            "jwks_endpoint": {"url": "http://idp.local/jwks"},
            "assertions": {"audience": ["api"], "issuers": ["https://idp.local"]}
        })));

        let derived = Arc::clone(&prototype)
            .with_config(Some(&json!({"assertions": {"audience": ["admin"]}})))
            .unwrap();
        assert!(!std::ptr::eq(
            Arc::as_ptr(&derived).cast::<u8>(),
            Arc::as_ptr(&prototype).cast::<u8>()
        ));
        assert_eq!(prototype.assertions().audience, vec!["api".to_owned()]);

        let same = Arc::clone(&prototype).with_config(None).unwrap();
        assert!(std::ptr::eq(
            Arc::as_ptr(&same).cast::<u8>(),
            Arc::as_ptr(&prototype).cast::<u8>()
        ));
    }

    #[test]
    fn unknown_override_is_rejected() {
        let prototype = Arc::new(authenticator(json!({"jwks_endpoint": {"url": "http://idp.local/jwks"}})));
        let err = prototype
            .with_config(Some(&json!({"jwks_endpoint": {"url": "http://other"}})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
