use mechanisms_sdk::{AuthDataSource, MechanismError};

use super::AuthDataExtractStrategy;

/// Reads the value of a named cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieValueExtractStrategy {
    name: String,
}

impl CookieValueExtractStrategy {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AuthDataExtractStrategy for CookieValueExtractStrategy {
    fn get_auth_data(&self, source: &dyn AuthDataSource) -> Result<String, MechanismError> {
        source
            .cookie(&self.name)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .ok_or(MechanismError::NoAuthDataPresent)
    }
}
