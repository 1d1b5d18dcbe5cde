//! Text templates rendered with request, subject and values.
//!
//! Templates use minijinja syntax, e.g. `{{ Subject.ID }}` or
//! `{{ Values.tenant }}`.

use std::fmt;
use std::sync::Arc;

use minijinja::Environment;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use mechanisms_sdk::MechanismError;

const TEMPLATE_NAME: &str = "template";

/// A template compiled once and rendered many times.
#[derive(Clone)]
pub struct Template {
    source: Arc<str>,
    env: Arc<Environment<'static>>,
    hash: [u8; 32],
}

impl Template {
    /// Compiles `source`.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] on a syntax error.
    pub fn new(source: &str) -> Result<Self, MechanismError> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source.to_owned())
            .map_err(|e| MechanismError::Configuration(format!("failed to parse template: {e}")))?;

        Ok(Self {
            source: Arc::from(source),
            env: Arc::new(env),
            hash: Sha256::digest(source.as_bytes()).into(),
        })
    }

    /// Renders the template with `data` as the root context.
    ///
    /// # Errors
    /// Returns [`MechanismError::Internal`] if rendering fails.
    pub fn render<S: Serialize>(&self, data: &S) -> Result<String, MechanismError> {
        self.env
            .get_template(TEMPLATE_NAME)
            .and_then(|tpl| tpl.render(data))
            .map_err(|e| MechanismError::Internal(format!("failed to render template: {e}")))
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }
}

/// Renders a one-off template string, used for endpoint URLs and headers.
/// Strings without template markers are returned unchanged.
///
/// # Errors
/// Returns [`MechanismError::Internal`] if the string does not parse or
/// render.
pub fn render_str<S: Serialize>(source: &str, data: &S) -> Result<String, MechanismError> {
    if !source.contains("{{") && !source.contains("{%") {
        return Ok(source.to_owned());
    }

    Environment::new()
        .render_str(source, data)
        .map_err(|e| MechanismError::Internal(format!("failed to render '{source}': {e}")))
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}
