use std::sync::Arc;

use mechanisms_sdk::{AuthDataSource, ErrorKind, MechanismError};

use super::AuthDataExtractStrategy;

/// Tries strategies in order and returns the first credential found.
///
/// Absence is reported only when every strategy reports absence; any other
/// error stops the search.
#[derive(Debug, Clone)]
pub struct CompositeExtractStrategy {
    strategies: Vec<Arc<dyn AuthDataExtractStrategy>>,
}

impl CompositeExtractStrategy {
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn AuthDataExtractStrategy>>) -> Self {
        Self { strategies }
    }
}

impl AuthDataExtractStrategy for CompositeExtractStrategy {
    fn get_auth_data(&self, source: &dyn AuthDataSource) -> Result<String, MechanismError> {
        for strategy in &self.strategies {
            match strategy.get_auth_data(source) {
                Ok(value) => return Ok(value),
                Err(err) if err.kind() == ErrorKind::NoAuthDataPresent => {}
                Err(err) => return Err(err),
            }
        }
        Err(MechanismError::NoAuthDataPresent)
    }
}
