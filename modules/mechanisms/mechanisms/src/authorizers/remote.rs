//! Authorizer delegating the decision to an external policy endpoint.
//!
//! The outcome of a successful call is cached per Subject when `cache_ttl` is
//! positive. Concurrent misses for the same key are not coalesced; each one
//! calls the endpoint and the last write wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gatehouse_cache::{Cache, CacheKeyBuilder, CacheValue, get_typed};
use mechanisms_sdk::{Authorizer, MechanismError, Request, RequestContext, Subject, is_empty_config};

use super::{REMOTE, subject_required};
use crate::config::decode;
use crate::contenttype::DecoderRegistry;
use crate::endpoint::{Endpoint, EndpointResponse};
use crate::expressions::{CompiledExpressions, Expression, ExpressionEnvironment};
use crate::registry::MechanismDeps;
use crate::template::Template;
use crate::values::Values;

/// Variable under which the decoded response is bound in expressions.
const PAYLOAD_VAR: &str = "Payload";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteAuthorizerConfig {
    endpoint: Endpoint,
    #[serde(default)]
    payload: Option<Template>,
    #[serde(default)]
    expressions: Vec<Expression>,
    #[serde(default)]
    forward_response_headers_to_upstream: Vec<String>,
    #[serde(default, with = "crate::config::duration")]
    cache_ttl: Duration,
    #[serde(default)]
    values: Values,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RemoteAuthorizerOverrides {
    payload: Option<Template>,
    expressions: Option<Vec<Expression>>,
    forward_response_headers_to_upstream: Option<Vec<String>>,
    #[serde(with = "crate::config::duration::option")]
    cache_ttl: Option<Duration>,
    values: Option<Values>,
}

/// What a successful remote call yielded. Cached as-is.
#[derive(Debug, Clone)]
pub struct AuthorizationInformation {
    pub headers: HeaderMap,
    /// Decoded response body; `None` for an empty body.
    pub payload: Option<Value>,
}

#[derive(Serialize)]
struct RenderData<'a> {
    #[serde(rename = "Request", skip_serializing_if = "Option::is_none")]
    request: Option<Value>,
    #[serde(rename = "Subject")]
    subject: &'a Subject,
    #[serde(rename = "Values")]
    values: &'a Values,
}

#[derive(Clone)]
pub struct RemoteAuthorizer {
    id: String,
    endpoint: Arc<Endpoint>,
    payload: Option<Template>,
    environment: ExpressionEnvironment,
    expressions: CompiledExpressions,
    headers_for_upstream: Arc<[HeaderName]>,
    ttl: Duration,
    values: Values,
    cache: Arc<dyn Cache>,
    http: reqwest::Client,
    decoders: Arc<DecoderRegistry>,
}

fn environment() -> ExpressionEnvironment {
    ExpressionEnvironment::new(&[PAYLOAD_VAR])
}

fn header_names(names: &[String]) -> Result<Arc<[HeaderName]>, MechanismError> {
    names
        .iter()
        .map(|name| {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                MechanismError::Configuration(format!("invalid header name '{name}' to forward: {e}"))
            })
        })
        .collect()
}

impl RemoteAuthorizer {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] for a malformed config, a
    /// missing payload on a headerless endpoint, or an expression or header
    /// name that does not compile.
    pub fn new(id: &str, config: Option<&Value>, deps: &MechanismDeps) -> Result<Self, MechanismError> {
        let cfg: RemoteAuthorizerConfig = decode(REMOTE, id, config)?;

        cfg.endpoint.validate()?;
        if cfg.payload.is_none() && cfg.endpoint.headers.is_empty() {
            return Err(MechanismError::Configuration(format!(
                "remote authorizer '{id}' requires a payload when the endpoint has no headers"
            )));
        }

        let environment = environment();
        let expressions = environment.compile(&cfg.expressions)?;

        Ok(Self {
            id: id.to_owned(),
            endpoint: Arc::new(cfg.endpoint),
            payload: cfg.payload,
            environment,
            expressions,
            headers_for_upstream: header_names(&cfg.forward_response_headers_to_upstream)?,
            ttl: cfg.cache_ttl,
            values: cfg.values,
            cache: Arc::clone(&deps.cache),
            http: deps.http.clone(),
            decoders: Arc::clone(&deps.decoders),
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn values(&self) -> &Values {
        &self.values
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Template> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn headers_for_upstream(&self) -> &[HeaderName] {
        &self.headers_for_upstream
    }

    #[must_use]
    pub fn expressions(&self) -> &CompiledExpressions {
        &self.expressions
    }

    /// Fingerprint of every input that determines the cached outcome for
    /// `subject`. `body` is the rendered payload, which carries the request
    /// data the payload template references.
    #[must_use]
    pub fn cache_key(&self, subject: &Subject, body: Option<&str>) -> String {
        let mut names: Vec<&str> = self.headers_for_upstream.iter().map(HeaderName::as_str).collect();
        names.sort_unstable();

        let ttl = u64::try_from(self.ttl.as_nanos()).unwrap_or(u64::MAX);

        CacheKeyBuilder::new()
            .field(self.endpoint.hash())
            .field(&self.id)
            .field(names.join(","))
            .field(self.payload.as_ref().map_or(&[][..], |tpl| &tpl.hash()[..]))
            .field(body.unwrap_or_default())
            .field(self.expressions.hash())
            .field(self.values.hash())
            .field_u64(ttl)
            .field(subject.hash())
            .finish()
    }

    /// Renders the configured payload template, if any.
    ///
    /// # Errors
    /// Returns [`MechanismError::Internal`] if rendering fails.
    pub fn render_payload(
        &self,
        request: &Request,
        subject: &Subject,
    ) -> Result<Option<String>, MechanismError> {
        self.payload
            .as_ref()
            .map(|tpl| tpl.render(&self.render_data(Some(request), subject)))
            .transpose()
    }

    /// Builds a rule-scoped variant. Every field present in `overrides`
    /// replaces the prototype's; `values` are merged key-wise.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] for unknown keys or an
    /// override that does not compile.
    pub fn derive(&self, overrides: Option<&Value>) -> Result<Self, MechanismError> {
        let overrides: RemoteAuthorizerOverrides = decode(REMOTE, &self.id, overrides)?;

        let expressions = match &overrides.expressions {
            Some(exprs) => self.environment.compile(exprs)?,
            None => self.expressions.clone(),
        };
        let headers_for_upstream = match &overrides.forward_response_headers_to_upstream {
            Some(names) => header_names(names)?,
            None => Arc::clone(&self.headers_for_upstream),
        };
        let values = match &overrides.values {
            Some(values) => self.values.merge(values),
            None => self.values.clone(),
        };

        Ok(Self {
            payload: overrides.payload.or_else(|| self.payload.clone()),
            expressions,
            headers_for_upstream,
            ttl: overrides.cache_ttl.unwrap_or(self.ttl),
            values,
            ..self.clone()
        })
    }

    fn render_data<'a>(&'a self, request: Option<&Request>, subject: &'a Subject) -> RenderData<'a> {
        RenderData {
            request: request.map(Request::to_value),
            subject,
            values: &self.values,
        }
    }

    #[tracing::instrument(skip_all)]
    async fn call(
        &self,
        subject: &Subject,
        body: Option<String>,
    ) -> Result<AuthorizationInformation, MechanismError> {
        tracing::debug!("Calling remote authorization endpoint");

        let response = self
            .endpoint
            .send(&self.http, Some(&self.render_data(None, subject)), body)
            .await?;

        let payload = self.read_response(&response)?;

        tracing::debug!("Verifying authorization response");
        let bound = payload.clone().unwrap_or(Value::Null);
        self.expressions.evaluate(&[(PAYLOAD_VAR, &bound)])?;

        Ok(AuthorizationInformation {
            headers: response.headers,
            payload,
        })
    }

    fn read_response(&self, response: &EndpointResponse) -> Result<Option<Value>, MechanismError> {
        if !response.status.is_success() {
            let status = response.status.as_u16();
            return Err(MechanismError::Authorization {
                reason: format!("authorization failed based on received response code: {status}"),
                status: Some(status),
            });
        }

        if response.body.is_empty() {
            tracing::debug!("No content received");
            return Ok(None);
        }

        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let Some(decoder) = self.decoders.decoder_for(content_type) else {
            tracing::warn!(
                content_type = content_type,
                "Content type is not supported. Treating it as string"
            );
            return Ok(Some(Value::String(
                String::from_utf8_lossy(&response.body).into_owned(),
            )));
        };
        decoder.decode(&response.body).map(Some)
    }

    async fn authorize(&self, ctx: &mut RequestContext) -> Result<(), MechanismError> {
        let subject = ctx.subject().ok_or_else(|| subject_required(REMOTE))?;

        let body = self.render_payload(ctx.request(), subject)?;

        let cache_key = (!self.ttl.is_zero()).then(|| self.cache_key(subject, body.as_deref()));
        let cached = cache_key
            .as_deref()
            .and_then(|key| get_typed::<AuthorizationInformation>(self.cache.as_ref(), key));

        let info = if let Some(info) = cached {
            tracing::debug!("Reusing authorization information from cache");
            info
        } else {
            let info = Arc::new(
                ctx.bounded("remote authorization", self.call(subject, body))
                    .await?,
            );
            if let Some(key) = &cache_key {
                let value: CacheValue = info.clone();
                self.cache.set(key, value, self.ttl);
            }
            info
        };

        for name in self.headers_for_upstream.iter() {
            if let Some(value) = info.headers.get(name).filter(|value| !value.is_empty()) {
                ctx.append_upstream_header(name.clone(), value.clone());
            }
        }

        if let Some(payload) = &info.payload
            && let Some(subject) = ctx.subject_mut()
        {
            subject.attributes.insert(self.id.clone(), payload.clone());
        }

        Ok(())
    }
}

#[async_trait]
impl Authorizer for RemoteAuthorizer {
    fn id(&self) -> &str {
        &self.id
    }

    #[tracing::instrument(skip_all, fields(mechanism_id = %self.id))]
    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), MechanismError> {
        tracing::debug!("Authorizing using remote authorizer");
        self.authorize(ctx)
            .await
            .map_err(|e| e.with_mechanism(&self.id))
    }

    fn with_config(
        self: Arc<Self>,
        config: Option<&Value>,
    ) -> Result<Arc<dyn Authorizer>, MechanismError> {
        if is_empty_config(config) {
            return Ok(self);
        }

        Ok(Arc::new(self.derive(config)?))
    }
}

impl fmt::Debug for RemoteAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAuthorizer")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("payload", &self.payload)
            .field("expressions", &self.expressions)
            .field("headers_for_upstream", &self.headers_for_upstream)
            .field("ttl", &self.ttl)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use gatehouse_cache::MemoryCache;
    use mechanisms_sdk::ErrorKind;
    use serde_json::json;

    use super::*;

    fn deps() -> MechanismDeps {
        MechanismDeps::new(Arc::new(MemoryCache::new()))
    }

    fn prototype() -> Arc<RemoteAuthorizer> {
        Arc::new(
            RemoteAuthorizer::new(
                "authz",
                Some(&json!({
                    "endpoint": {"url": "http://pdp.local/check", "method": "POST"},
                    "payload": "{\"user\": \"{{ Subject.ID }}\"}",
                    "expressions": [{"expression": "Payload.allowed == true"}],
                    "forward_response_headers_to_upstream": ["X-User", "X-Tenant"],
                    "cache_ttl": "5m",
                    "values": {"tenant": "acme"}
                })),
                &deps(),
            )
            .unwrap(),
        )
    }

    fn override_with(prototype: &RemoteAuthorizer, overrides: Value) -> RemoteAuthorizer {
        prototype.derive(Some(&overrides)).unwrap()
    }

    #[test]
    fn payload_required_without_endpoint_headers() {
        let err = RemoteAuthorizer::new(
            "authz",
            Some(&json!({"endpoint": {"url": "http://pdp.local"}})),
            &deps(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        RemoteAuthorizer::new(
            "authz",
            Some(&json!({"endpoint": {
                "url": "http://pdp.local/{{ Subject.ID }}",
                "headers": {"X-User": "{{ Subject.ID }}"}
            }})),
            &deps(),
        )
        .unwrap();
    }

    #[test]
    fn invalid_expression_or_header_is_configuration_error() {
        let base = json!({"endpoint": {"url": "http://pdp.local", "headers": {"A": "b"}}});

        let mut cfg = base.clone();
        cfg["expressions"] = json!([{"expression": "Subject.ID == 'x'"}]);
        let err = RemoteAuthorizer::new("authz", Some(&cfg), &deps()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut cfg = base;
        cfg["forward_response_headers_to_upstream"] = json!(["bad header"]);
        let err = RemoteAuthorizer::new("authz", Some(&cfg), &deps()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn cache_key_is_deterministic_and_input_sensitive() {
        let authz = prototype();
        let alice = Subject::new("alice");
        let key = authz.cache_key(&alice, None);

        assert_eq!(key, authz.cache_key(&alice, None));
        assert_eq!(key.len(), 64);
        assert_ne!(key, authz.cache_key(&Subject::new("bob"), None));

        for overrides in [
            json!({"cache_ttl": "10m"}),
            json!({"forward_response_headers_to_upstream": ["X-User"]}),
            json!({"payload": "{{ Subject.ID }}"}),
            json!({"values": {"tenant": "other"}}),
            json!({"expressions": [{"expression": "Payload.allowed == true"}, {"expression": "Payload.role == 'admin'"}]}),
            json!({"expressions": [{"expression": "Payload.allowed == true", "message": "denied"}]}),
        ] {
            let derived = override_with(&authz, overrides.clone());
            assert_ne!(derived.cache_key(&alice, None), key, "override {overrides}");
        }
    }

    #[test]
    fn cache_key_tracks_rendered_payload() {
        let authz = prototype();
        let alice = Subject::new("alice");
        assert_ne!(
            authz.cache_key(&alice, Some("{\"path\": \"/public\"}")),
            authz.cache_key(&alice, Some("{\"path\": \"/admin\"}"))
        );
    }

    #[test]
    fn cache_key_ignores_forwarded_header_order() {
        let authz = prototype();
        let reordered = override_with(&authz, json!({"forward_response_headers_to_upstream": ["x-tenant", "x-user"]}));
        assert_eq!(
            reordered.cache_key(&Subject::new("alice"), None),
            authz.cache_key(&Subject::new("alice"), None)
        );
    }

    #[test]
    fn ttl_override_changes_only_ttl() {
        let authz = prototype();
        let derived = override_with(&authz, json!({"cache_ttl": "1s"}));

        assert_eq!(derived.ttl(), Duration::from_secs(1));
        assert_eq!(authz.ttl(), Duration::from_secs(300));
        assert_eq!(derived.payload(), authz.payload());
        assert_eq!(derived.values(), authz.values());
        assert_eq!(derived.headers_for_upstream(), authz.headers_for_upstream());
        assert_eq!(derived.expressions().len(), authz.expressions().len());
    }

    #[test]
    fn values_override_merges_keywise() {
        let authz = prototype();
        let derived = override_with(&authz, json!({"values": {"region": "eu"}}));
        assert_eq!(derived.values().get("tenant"), Some("acme"));
        assert_eq!(derived.values().get("region"), Some("eu"));
        assert_eq!(authz.values().get("region"), None);
    }

    #[test]
    fn empty_override_returns_prototype() {
        let authz = prototype();
        for cfg in [None, Some(json!({})), Some(Value::Null)] {
            let derived = RemoteAuthorizer::with_config(Arc::clone(&authz), cfg.as_ref()).unwrap();
            assert!(std::ptr::eq(
                Arc::as_ptr(&derived).cast::<u8>(),
                Arc::as_ptr(&authz).cast::<u8>()
            ));
        }
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let err = RemoteAuthorizer::with_config(prototype(), Some(&json!({"endpoint": {"url": "x"}})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
