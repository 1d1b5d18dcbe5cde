use mechanisms_sdk::{AuthDataSource, MechanismError};

use super::AuthDataExtractStrategy;

/// Reads a URL query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameterExtractStrategy {
    name: String,
}

impl QueryParameterExtractStrategy {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AuthDataExtractStrategy for QueryParameterExtractStrategy {
    fn get_auth_data(&self, source: &dyn AuthDataSource) -> Result<String, MechanismError> {
        source
            .query_parameter(&self.name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or(MechanismError::NoAuthDataPresent)
    }
}
