use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mechanisms_sdk::{Authorizer, MechanismError, RequestContext};

use super::{ALLOW, DENY, reject_config};

/// Lets every request through.
#[derive(Debug, Clone)]
pub struct AllowAuthorizer {
    id: String,
}

/// Rejects every request.
#[derive(Debug, Clone)]
pub struct DenyAuthorizer {
    id: String,
}

impl AllowAuthorizer {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if any config is given.
    pub fn new(id: &str, config: Option<&Value>) -> Result<Self, MechanismError> {
        reject_config(ALLOW, id, config)?;
        Ok(Self { id: id.to_owned() })
    }
}

impl DenyAuthorizer {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if any config is given.
    pub fn new(id: &str, config: Option<&Value>) -> Result<Self, MechanismError> {
        reject_config(DENY, id, config)?;
        Ok(Self { id: id.to_owned() })
    }
}

#[async_trait]
impl Authorizer for AllowAuthorizer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _ctx: &mut RequestContext) -> Result<(), MechanismError> {
        tracing::debug!(mechanism_id = %self.id, "Authorizing using allow authorizer");
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        _config: Option<&Value>,
    ) -> Result<Arc<dyn Authorizer>, MechanismError> {
        Ok(self)
    }
}

#[async_trait]
impl Authorizer for DenyAuthorizer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _ctx: &mut RequestContext) -> Result<(), MechanismError> {
        tracing::debug!(mechanism_id = %self.id, "Authorizing using deny authorizer");
        Err(MechanismError::authorization("denied by authorizer").with_mechanism(&self.id))
    }

    fn with_config(
        self: Arc<Self>,
        _config: Option<&Value>,
    ) -> Result<Arc<dyn Authorizer>, MechanismError> {
        Ok(self)
    }
}
