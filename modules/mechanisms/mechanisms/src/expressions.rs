//! Boolean CEL expressions gating authorization decisions.

use std::sync::Arc;

use cel_interpreter::{Context, Program, Value as CelValue};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use mechanisms_sdk::MechanismError;

/// Configured expression with an optional failure message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expression {
    pub expression: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl Expression {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Fixed set of variables expressions may reference.
///
/// Created once per mechanism prototype and shared by every derived variant.
#[derive(Debug, Clone)]
pub struct ExpressionEnvironment {
    variables: Arc<[&'static str]>,
}

struct CompiledExpression {
    source: String,
    message: Option<String>,
    program: Program,
}

/// Expressions compiled against an [`ExpressionEnvironment`].
#[derive(Clone, Default)]
pub struct CompiledExpressions(Arc<[CompiledExpression]>);

impl ExpressionEnvironment {
    #[must_use]
    pub fn new(variables: &[&'static str]) -> Self {
        Self {
            variables: Arc::from(variables),
        }
    }

    /// Compiles `expressions`, rejecting references to undeclared variables.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] on a parse error or an
    /// unknown variable.
    pub fn compile(&self, expressions: &[Expression]) -> Result<CompiledExpressions, MechanismError> {
        let compiled = expressions
            .iter()
            .map(|expr| self.compile_one(expr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledExpressions(compiled.into()))
    }

    fn compile_one(&self, expr: &Expression) -> Result<CompiledExpression, MechanismError> {
        let program = Program::compile(&expr.expression).map_err(|e| {
            MechanismError::Configuration(format!(
                "failed to compile expression '{}': {e}",
                expr.expression
            ))
        })?;

        let references = program.references();
        if let Some(unknown) = references
            .variables()
            .into_iter()
            .find(|name| !self.variables.iter().any(|declared| declared == name))
        {
            return Err(MechanismError::Configuration(format!(
                "expression '{}' references undeclared variable '{unknown}'",
                expr.expression
            )));
        }

        Ok(CompiledExpression {
            source: expr.expression.clone(),
            message: expr.message.clone(),
            program,
        })
    }
}

impl CompiledExpressions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Digest over every expression's source and message, in order.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for expr in self.0.iter() {
            for part in [expr.source.as_str(), expr.message.as_deref().unwrap_or_default()] {
                hasher.update(part.len().to_be_bytes());
                hasher.update(part.as_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Evaluates every expression in order with `bindings` in scope.
    ///
    /// # Errors
    /// Returns [`MechanismError::Authorization`] for the first expression that
    /// is false, not boolean, or fails at runtime. Returns
    /// [`MechanismError::Internal`] if a binding cannot be converted.
    pub fn evaluate(&self, bindings: &[(&str, &Value)]) -> Result<(), MechanismError> {
        if self.0.is_empty() {
            return Ok(());
        }

        let mut context = Context::default();
        for (name, value) in bindings {
            context.add_variable(*name, *value).map_err(|e| {
                MechanismError::Internal(format!("failed to bind '{name}' for evaluation: {e}"))
            })?;
        }

        for (idx, expr) in self.0.iter().enumerate() {
            let reason = || {
                expr.message
                    .clone()
                    .unwrap_or_else(|| format!("expression {} failed", idx + 1))
            };

            match expr.program.execute(&context) {
                Ok(CelValue::Bool(true)) => {}
                Ok(CelValue::Bool(false)) => {
                    tracing::debug!(expression = %expr.source, "Expression evaluated to false");
                    return Err(MechanismError::authorization(reason()));
                }
                Ok(_) => {
                    return Err(MechanismError::authorization(format!(
                        "{}: expression '{}' did not evaluate to a boolean",
                        reason(),
                        expr.source
                    )));
                }
                Err(e) => {
                    return Err(MechanismError::authorization(format!(
                        "{}: failed evaluating expression '{}': {e}",
                        reason(),
                        expr.source
                    )));
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledExpressions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|e| e.source.as_str()))
            .finish()
    }
}
