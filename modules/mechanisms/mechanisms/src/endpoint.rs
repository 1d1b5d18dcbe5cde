//! Outbound HTTP endpoint description and client call.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};

use gatehouse_cache::CacheKeyBuilder;
use mechanisms_sdk::MechanismError;

use crate::template::render_str;

/// Configured external endpoint.
///
/// The URL and header values may contain template expressions; they are
/// rendered per call when render data is supplied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "crate::config::duration::option")]
    pub timeout: Option<Duration>,
}

/// Fully read response of an endpoint call.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

fn default_method() -> String {
    Method::GET.as_str().to_owned()
}

impl Endpoint {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Checks the parts that can be checked before any template is rendered.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] for an empty URL, an invalid
    /// method, or an untemplated URL that does not parse.
    pub fn validate(&self) -> Result<(), MechanismError> {
        if self.url.trim().is_empty() {
            return Err(MechanismError::Configuration(
                "endpoint url must not be empty".to_owned(),
            ));
        }
        self.http_method().map_err(|_| {
            MechanismError::Configuration(format!("invalid endpoint method '{}'", self.method))
        })?;
        if !self.url.contains("{{") {
            url::Url::parse(&self.url).map_err(|e| {
                MechanismError::Configuration(format!("invalid endpoint url '{}': {e}", self.url))
            })?;
        }
        Ok(())
    }

    /// `true` if a header named `name` is configured (case-insensitive).
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Identity fingerprint over URL, method and headers.
    #[must_use]
    pub fn hash(&self) -> String {
        self.headers
            .iter()
            .fold(
                CacheKeyBuilder::new().field(&self.url).field(&self.method),
                |builder, (k, v)| builder.field(k.to_ascii_lowercase()).field(v),
            )
            .finish()
    }

    fn http_method(&self) -> Result<Method, http::method::InvalidMethod> {
        Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
    }

    /// Issues the call and reads the whole response.
    ///
    /// `render` supplies the data for templated URL and header values; with
    /// `None` they are used verbatim. Any status is returned as-is.
    ///
    /// # Errors
    /// [`MechanismError::CommunicationTimeout`] if the configured timeout
    /// elapses, [`MechanismError::Communication`] for other transport
    /// failures, [`MechanismError::Internal`] if the request cannot be built.
    #[tracing::instrument(skip_all, fields(method = %self.method))]
    pub async fn send<S: Serialize + Sync>(
        &self,
        client: &reqwest::Client,
        render: Option<&S>,
        body: Option<String>,
    ) -> Result<EndpointResponse, MechanismError> {
        let url = match render {
            Some(data) => render_str(&self.url, data)?,
            None => self.url.clone(),
        };

        let method = self.http_method().map_err(|_| {
            MechanismError::Internal(format!("invalid endpoint method '{}'", self.method))
        })?;
        let mut request = client.request(method, &url);
        for (name, value) in &self.headers {
            let value = match render {
                Some(data) => render_str(value, data)?,
                None => value.clone(),
            };
            request = request.header(name.as_str(), value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        tracing::debug!(url = %url, "Calling endpoint");
        let response = request.send().await.map_err(|e| classify(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| classify(&e))?;

        Ok(EndpointResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: &reqwest::Error) -> MechanismError {
    if err.is_timeout() {
        MechanismError::CommunicationTimeout(format!("request to the endpoint timed out: {err}"))
    } else if err.is_builder() {
        MechanismError::Internal(format!("failed creating request: {err}"))
    } else {
        MechanismError::Communication(format!("request to the endpoint failed: {err}"))
    }
}
