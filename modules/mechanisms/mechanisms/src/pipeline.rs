//! Ordered execution of a rule's mechanisms over one request.

use std::fmt;
use std::sync::Arc;

use mechanisms_sdk::{
    Authenticator, Authorizer, Denial, DenialReason, MechanismError, RequestContext, Upstream,
};

/// Rule-scoped mechanisms. Authenticators are alternatives, authorizers are
/// all required.
#[derive(Clone)]
pub struct Pipeline {
    authenticators: Vec<Arc<dyn Authenticator>>,
    authorizers: Vec<Arc<dyn Authorizer>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        authenticators: Vec<Arc<dyn Authenticator>>,
        authorizers: Vec<Arc<dyn Authorizer>>,
    ) -> Self {
        Self {
            authenticators,
            authorizers,
        }
    }

    /// Runs the mechanisms against `ctx`, recording the terminal error in it.
    ///
    /// Authenticators are tried in order until one succeeds; if all fail the
    /// last error is kept. Authorizers then run in order and the first error
    /// stops the pipeline.
    pub async fn execute(&self, ctx: &mut RequestContext) {
        if let Err(err) = self.authenticate(ctx).await {
            ctx.set_error(err);
            return;
        }

        for authorizer in &self.authorizers {
            if let Err(err) = authorizer.execute(ctx).await {
                ctx.set_error(err.with_mechanism(authorizer.id()));
                return;
            }
        }
    }

    async fn authenticate(&self, ctx: &mut RequestContext) -> Result<(), MechanismError> {
        let mut last_error = None;

        for authenticator in &self.authenticators {
            match authenticator.execute(ctx).await {
                Ok(subject) => {
                    tracing::debug!(mechanism_id = authenticator.id(), subject = %subject.id, "Subject authenticated");
                    ctx.set_subject(subject);
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(
                        mechanism_id = authenticator.id(),
                        error = %err,
                        "Authenticator failed, trying next"
                    );
                    last_error = Some(err.with_mechanism(authenticator.id()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MechanismError::Internal("pipeline has no authenticators".to_owned())
        }))
    }

    /// Executes the pipeline and finalizes the context.
    ///
    /// # Errors
    /// Returns the [`Denial`] derived from the terminal error, if any.
    pub async fn run(&self, mut ctx: RequestContext) -> Result<Upstream, Denial> {
        self.execute(&mut ctx).await;

        if let Some(err) = ctx.error() {
            match err.denial_reason() {
                DenialReason::Internal | DenialReason::ServiceUnavailable => {
                    tracing::error!(error = %err, "Request denied");
                }
                DenialReason::CredentialsMissing
                | DenialReason::CredentialsInvalid
                | DenialReason::PolicyDenied => {
                    tracing::info!(error = %err, "Request denied");
                }
            }
        }

        ctx.finalize()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "authenticators",
                &self.authenticators.iter().map(|m| m.id()).collect::<Vec<_>>(),
            )
            .field(
                "authorizers",
                &self.authorizers.iter().map(|m| m.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
