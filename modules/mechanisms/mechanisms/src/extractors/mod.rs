//! Strategies pulling raw credentials out of a request.

mod composite;
mod cookie;
mod header;
mod query;

use std::fmt::Debug;
use std::sync::Arc;

use serde::Deserialize;

use mechanisms_sdk::{AuthDataSource, MechanismError};

pub use composite::CompositeExtractStrategy;
pub use cookie::CookieValueExtractStrategy;
pub use header::HeaderValueExtractStrategy;
pub use query::QueryParameterExtractStrategy;

/// Extracts a raw credential from an [`AuthDataSource`].
pub trait AuthDataExtractStrategy: Send + Sync + Debug {
    /// # Errors
    /// [`MechanismError::NoAuthDataPresent`] when the credential is absent.
    fn get_auth_data(&self, source: &dyn AuthDataSource) -> Result<String, MechanismError>;
}

/// Configuration form of a single extraction strategy.
///
/// ```yaml
/// - header: Authorization
///   prefix: "Bearer "
/// - cookie: session
/// - query_parameter: access_token
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExtractorConfig {
    Header(HeaderSource),
    Cookie(CookieSource),
    QueryParameter(QueryParameterSource),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderSource {
    pub header: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CookieSource {
    pub cookie: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryParameterSource {
    pub query_parameter: String,
}

impl ExtractorConfig {
    #[must_use]
    pub fn header(header: impl Into<String>, prefix: Option<&str>) -> Self {
        Self::Header(HeaderSource {
            header: header.into(),
            prefix: prefix.map(str::to_owned),
        })
    }

    #[must_use]
    pub fn cookie(cookie: impl Into<String>) -> Self {
        Self::Cookie(CookieSource {
            cookie: cookie.into(),
        })
    }

    #[must_use]
    pub fn query_parameter(query_parameter: impl Into<String>) -> Self {
        Self::QueryParameter(QueryParameterSource {
            query_parameter: query_parameter.into(),
        })
    }

    #[must_use]
    pub fn strategy(&self) -> Arc<dyn AuthDataExtractStrategy> {
        match self {
            Self::Header(HeaderSource { header, prefix }) => Arc::new(HeaderValueExtractStrategy::new(
                header.clone(),
                prefix.clone().unwrap_or_default(),
            )),
            Self::Cookie(CookieSource { cookie }) => {
                Arc::new(CookieValueExtractStrategy::new(cookie.clone()))
            }
            Self::QueryParameter(QueryParameterSource { query_parameter }) => {
                Arc::new(QueryParameterExtractStrategy::new(query_parameter.clone()))
            }
        }
    }
}

/// Builds one strategy out of `configs`: a single entry is used as-is, more
/// entries are tried in order.
#[must_use]
pub fn strategy_from_config(configs: &[ExtractorConfig]) -> Arc<dyn AuthDataExtractStrategy> {
    match configs {
        [single] => single.strategy(),
        many => Arc::new(CompositeExtractStrategy::new(
            many.iter().map(ExtractorConfig::strategy).collect(),
        )),
    }
}
