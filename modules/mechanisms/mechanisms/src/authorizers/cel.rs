use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use mechanisms_sdk::{Authorizer, MechanismError, RequestContext, is_empty_config};

use super::{CEL, REQUEST_VAR, SUBJECT_VAR, subject_required};
use crate::config::decode;
use crate::expressions::{CompiledExpressions, Expression, ExpressionEnvironment};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CelAuthorizerConfig {
    expressions: Vec<Expression>,
}

/// Evaluates expressions over the Subject and the inbound request locally.
#[derive(Debug, Clone)]
pub struct CelAuthorizer {
    id: String,
    environment: ExpressionEnvironment,
    expressions: CompiledExpressions,
}

impl CelAuthorizer {
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if no expressions are
    /// configured or one of them does not compile.
    pub fn new(id: &str, config: Option<&Value>) -> Result<Self, MechanismError> {
        let environment = ExpressionEnvironment::new(&[SUBJECT_VAR, REQUEST_VAR]);
        let cfg: CelAuthorizerConfig = decode(CEL, id, config)?;
        let expressions = compile(&environment, id, &cfg.expressions)?;

        Ok(Self {
            id: id.to_owned(),
            environment,
            expressions,
        })
    }
}

fn compile(
    environment: &ExpressionEnvironment,
    id: &str,
    expressions: &[Expression],
) -> Result<CompiledExpressions, MechanismError> {
    if expressions.is_empty() {
        return Err(MechanismError::Configuration(format!(
            "cel authorizer '{id}' requires at least one expression"
        )));
    }
    environment.compile(expressions)
}

#[async_trait]
impl Authorizer for CelAuthorizer {
    fn id(&self) -> &str {
        &self.id
    }

    #[tracing::instrument(skip_all, fields(mechanism_id = %self.id))]
    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), MechanismError> {
        tracing::debug!("Authorizing using CEL authorizer");

        let subject = ctx
            .subject()
            .ok_or_else(|| subject_required(CEL).with_mechanism(&self.id))?;
        let subject = serde_json::to_value(subject)
            .map_err(|e| MechanismError::Internal(format!("failed to serialize subject: {e}")))
            .map_err(|e| e.with_mechanism(&self.id))?;
        let request = ctx.request().to_value();

        self.expressions
            .evaluate(&[(SUBJECT_VAR, &subject), (REQUEST_VAR, &request)])
            .map_err(|e| e.with_mechanism(&self.id))
    }

    fn with_config(
        self: Arc<Self>,
        config: Option<&Value>,
    ) -> Result<Arc<dyn Authorizer>, MechanismError> {
        if is_empty_config(config) {
            return Ok(self);
        }

        let cfg: CelAuthorizerConfig = decode(CEL, &self.id, config)?;
        let expressions = compile(&self.environment, &self.id, &cfg.expressions)?;

        Ok(Arc::new(Self {
            id: self.id.clone(),
            environment: self.environment.clone(),
            expressions,
        }))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use http::Method;
    use mechanisms_sdk::{ErrorKind, Request, Subject};
    use serde_json::json;
    use url::Url;

    use super::*;

    fn ctx(subject: Option<Subject>) -> RequestContext {
        let request = Request::new(Method::POST, Url::parse("https://api.local/orders?id=7").unwrap());
        let mut ctx = RequestContext::new(request);
        if let Some(subject) = subject {
            ctx.set_subject(subject);
        }
        ctx
    }

    fn admin() -> Subject {
        let attributes = json!({"roles": ["admin"]});
        Subject::new("alice").with_attributes(attributes.as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn evaluates_over_subject_and_request() {
        let auth = CelAuthorizer::new(
            "cel",
            Some(&json!({"expressions": [
                {"expression": "Subject.ID == 'alice'"},
                {"expression": "'admin' in Subject.Attributes.roles"},
                {"expression": "Request.Method == 'POST'"},
            ]})),
        )
        .unwrap();

        auth.execute(&mut ctx(Some(admin()))).await.unwrap();
    }

    #[tokio::test]
    async fn failing_expression_denies_with_message() {
        let auth = CelAuthorizer::new(
            "cel",
            Some(&json!({"expressions": [
                {"expression": "Request.URL.Path == '/admin'", "message": "admin area only"},
            ]})),
        )
        .unwrap();

        let err = auth.execute(&mut ctx(Some(admin()))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.mechanism_id(), Some("cel"));
        assert!(err.to_string().contains("admin area only"));
    }

    #[tokio::test]
    async fn missing_subject_is_internal_error() {
        let auth = CelAuthorizer::new("cel", Some(&json!({"expressions": [{"expression": "true"}]}))).unwrap();
        let err = auth.execute(&mut ctx(None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn requires_expressions() {
        let err = CelAuthorizer::new("cel", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = CelAuthorizer::new("cel", Some(&json!({"expressions": []}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn override_replaces_expressions() {
        let prototype = Arc::new(
            CelAuthorizer::new("cel", Some(&json!({"expressions": [{"expression": "false"}]}))).unwrap(),
        );
        let derived = Arc::clone(&prototype)
            .with_config(Some(&json!({"expressions": [{"expression": "Subject.ID == 'alice'"}]})))
            .unwrap();

        derived.execute(&mut ctx(Some(admin()))).await.unwrap();
        assert!(prototype.execute(&mut ctx(Some(admin()))).await.is_err());

        let err = Arc::clone(&prototype)
            .with_config(Some(&json!({"expressions": [{"expression": "Payload.x"}]})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
