use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use mechanisms_sdk::{Authenticator, MechanismError, RequestContext, Subject, is_empty_config};

use super::ANONYMOUS;
use crate::config::decode;

const DEFAULT_SUBJECT: &str = "anonymous";

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AnonymousConfig {
    subject: String,
}

impl Default for AnonymousConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_owned(),
        }
    }
}

/// Accepts every request as a fixed subject.
#[derive(Debug, Clone)]
pub struct AnonymousAuthenticator {
    id: String,
    subject: String,
}

impl AnonymousAuthenticator {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] for a malformed config or an
    /// empty subject.
    pub fn new(id: &str, config: Option<&Value>) -> Result<Self, MechanismError> {
        let cfg: AnonymousConfig = decode(ANONYMOUS, id, config)?;
        Self::validated(id.to_owned(), cfg.subject)
    }

    fn validated(id: String, subject: String) -> Result<Self, MechanismError> {
        if subject.is_empty() {
            return Err(MechanismError::Configuration(format!(
                "anonymous authenticator '{id}' requires a non-empty subject"
            )));
        }
        Ok(Self { id, subject })
    }
}

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _ctx: &RequestContext) -> Result<Subject, MechanismError> {
        tracing::debug!(mechanism_id = %self.id, "Authenticating using anonymous authenticator");
        Ok(Subject::new(self.subject.clone()))
    }

    fn with_config(
        self: Arc<Self>,
        config: Option<&Value>,
    ) -> Result<Arc<dyn Authenticator>, MechanismError> {
        if is_empty_config(config) {
            return Ok(self);
        }

        let cfg: AnonymousConfig = decode(ANONYMOUS, &self.id, config)?;
        Ok(Arc::new(Self::validated(self.id.clone(), cfg.subject)?))
    }
}
