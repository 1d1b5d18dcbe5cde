//! Claim-level policy applied to verified tokens.

use std::time::Duration;

use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;

const DEFAULT_LEEWAY: Duration = Duration::from_secs(10);

/// Asymmetric JWS algorithms accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_ALGORITHMS: &[&str] = &[
    "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Assertions {
    /// Accepted `iss` values; empty accepts any issuer.
    pub issuers: Vec<String>,
    /// Required `aud` values; empty skips the audience check.
    pub audience: Vec<String>,
    pub allowed_algorithms: Vec<String>,
    /// Clock skew tolerated for `exp` and `nbf`.
    #[serde(with = "crate::config::duration")]
    pub validity_leeway: Duration,
}

/// Partial [`Assertions`] used in per-rule overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssertionsOverride {
    pub issuers: Option<Vec<String>>,
    pub audience: Option<Vec<String>>,
    pub allowed_algorithms: Option<Vec<String>>,
    #[serde(with = "crate::config::duration::option")]
    pub validity_leeway: Option<Duration>,
}

impl Default for Assertions {
    fn default() -> Self {
        Self {
            issuers: Vec::new(),
            audience: Vec::new(),
            allowed_algorithms: DEFAULT_ALLOWED_ALGORITHMS
                .iter()
                .map(|alg| (*alg).to_owned())
                .collect(),
            validity_leeway: DEFAULT_LEEWAY,
        }
    }
}

impl Assertions {
    #[must_use]
    pub fn is_algorithm_allowed(&self, alg: &str) -> bool {
        self.allowed_algorithms.iter().any(|allowed| allowed == alg)
    }

    /// Returns a copy with every field present in `overrides` replaced.
    #[must_use]
    pub fn merge(&self, overrides: AssertionsOverride) -> Self {
        Self {
            issuers: overrides.issuers.unwrap_or_else(|| self.issuers.clone()),
            audience: overrides.audience.unwrap_or_else(|| self.audience.clone()),
            allowed_algorithms: overrides
                .allowed_algorithms
                .unwrap_or_else(|| self.allowed_algorithms.clone()),
            validity_leeway: overrides.validity_leeway.unwrap_or(self.validity_leeway),
        }
    }

    /// Validation settings for a token signed with `alg`.
    ///
    /// `exp` is always required. `iss` and `aud` are required as soon as
    /// issuers or an audience are configured.
    #[must_use]
    pub fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.validity_leeway.as_secs();
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        if !self.issuers.is_empty() {
            validation.set_issuer(&self.issuers);
            validation.required_spec_claims.insert("iss".to_owned());
        }
        if self.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audience);
            validation.required_spec_claims.insert("aud".to_owned());
        }
        validation
    }
}
