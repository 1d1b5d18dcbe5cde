//! Mechanism traits.
//!
//! Both traits follow the prototype model: a configured instance is built
//! once at startup, and rules derive per-rule variants from it with
//! `with_config`. Derivation never mutates the prototype.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::MechanismError;
use crate::subject::Subject;

/// Establishes a [`Subject`] from request credentials.
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    fn id(&self) -> &str;

    /// Authenticates the request.
    ///
    /// # Errors
    /// [`MechanismError::NoAuthDataPresent`] when the request carries no
    /// credential, any other variant when a credential is present but
    /// rejected.
    async fn execute(&self, ctx: &RequestContext) -> Result<Subject, MechanismError>;

    /// Derives a per-rule variant. An absent or empty `config` returns the
    /// receiver itself.
    ///
    /// # Errors
    /// [`MechanismError::Configuration`] if `config` is malformed or names
    /// settings the mechanism does not allow to override.
    fn with_config(
        self: Arc<Self>,
        config: Option<&Value>,
    ) -> Result<Arc<dyn Authenticator>, MechanismError>;
}

/// Decides whether the authenticated subject may proceed.
#[async_trait]
pub trait Authorizer: Send + Sync + Debug {
    fn id(&self) -> &str;

    /// Authorizes the subject held by `ctx`. May enrich the subject and queue
    /// upstream headers.
    ///
    /// # Errors
    /// [`MechanismError::Authorization`] on a deny decision;
    /// [`MechanismError::Internal`] when `ctx` holds no subject.
    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), MechanismError>;

    /// Derives a per-rule variant. An absent or empty `config` returns the
    /// receiver itself.
    ///
    /// # Errors
    /// [`MechanismError::Configuration`] if `config` is malformed.
    fn with_config(
        self: Arc<Self>,
        config: Option<&Value>,
    ) -> Result<Arc<dyn Authorizer>, MechanismError>;
}

/// `true` for a missing, `null` or empty-object override.
#[must_use]
pub fn is_empty_config(config: Option<&Value>) -> bool {
    match config {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}
