//! Built-in authorizers.

mod cel;
mod fixed;
pub mod remote;

use serde_json::Value;

use mechanisms_sdk::{MechanismError, is_empty_config};

pub use cel::CelAuthorizer;
pub use fixed::{AllowAuthorizer, DenyAuthorizer};
pub use remote::RemoteAuthorizer;

/// Kind name of [`RemoteAuthorizer`].
pub const REMOTE: &str = "remote";
/// Kind name of [`AllowAuthorizer`].
pub const ALLOW: &str = "allow";
/// Kind name of [`DenyAuthorizer`].
pub const DENY: &str = "deny";
/// Kind name of [`CelAuthorizer`].
pub const CEL: &str = "cel";

/// Variable under which the Subject is bound in expressions and templates.
const SUBJECT_VAR: &str = "Subject";
/// Variable under which the inbound request is bound.
const REQUEST_VAR: &str = "Request";

fn subject_required(kind: &str) -> MechanismError {
    MechanismError::Internal(format!("failed to execute {kind} authorizer due to missing subject"))
}

fn reject_config(kind: &str, id: &str, config: Option<&Value>) -> Result<(), MechanismError> {
    if is_empty_config(config) {
        Ok(())
    } else {
        Err(MechanismError::Configuration(format!(
            "{kind} authorizer '{id}' does not accept configuration"
        )))
    }
}
