//! Error taxonomy shared by every mechanism.

use serde::Serialize;
use thiserror::Error;

/// Errors produced by mechanisms and the pipeline.
///
/// Request-time failures are limited to the variants other than
/// `Configuration`, which is raised while building or deriving mechanisms.
#[derive(Debug, Error)]
pub enum MechanismError {
    /// No credential material found in the request. Expected; the pipeline
    /// decides whether this denies the request.
    #[error("no authentication data present")]
    NoAuthDataPresent,

    /// The credential is structurally malformed.
    #[error("malformed credential: {0}")]
    InvalidFormat(String),

    /// Zero or several keys matched the credential's key identifier.
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// The resolved key's algorithm is not in the allow-list.
    #[error("algorithm '{0}' is not allowed")]
    AlgorithmNotAllowed(String),

    /// Signature verification or decryption failed.
    #[error("credential verification failed: {0}")]
    Verification(String),

    /// Verified claims violate the configured assertions.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// An external call hit its timeout or the request deadline.
    #[error("communication timed out: {0}")]
    CommunicationTimeout(String),

    /// An external call failed for any other reason, cancellation included.
    #[error("communication failed: {0}")]
    Communication(String),

    /// The policy decision is "deny".
    #[error("authorization failed: {reason}")]
    Authorization {
        reason: String,
        /// Status code returned by a remote policy endpoint, if any.
        status: Option<u16>,
    },

    /// Templating, marshaling or environment failures.
    #[error("internal error: {0}")]
    Internal(String),

    /// Malformed mechanism setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any of the above, attributed to the mechanism that raised it.
    #[error("mechanism '{id}': {source}")]
    Mechanism {
        id: String,
        #[source]
        source: Box<MechanismError>,
    },
}

/// Discriminant of [`MechanismError`], looking through the mechanism wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoAuthDataPresent,
    InvalidFormat,
    KeyResolution,
    AlgorithmNotAllowed,
    Verification,
    Assertion,
    CommunicationTimeout,
    Communication,
    Authorization,
    Internal,
    Configuration,
}

/// User-visible reason class of a denied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    CredentialsMissing,
    CredentialsInvalid,
    PolicyDenied,
    ServiceUnavailable,
    Internal,
}

impl MechanismError {
    /// Shorthand for a deny decision without a status code.
    #[must_use]
    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
            status: None,
        }
    }

    /// Attributes the error to mechanism `id`. Already attributed errors keep
    /// their original attribution.
    #[must_use]
    pub fn with_mechanism(self, id: &str) -> Self {
        match self {
            Self::Mechanism { .. } => self,
            other => Self::Mechanism {
                id: id.to_owned(),
                source: Box::new(other),
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAuthDataPresent => ErrorKind::NoAuthDataPresent,
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::KeyResolution(_) => ErrorKind::KeyResolution,
            Self::AlgorithmNotAllowed(_) => ErrorKind::AlgorithmNotAllowed,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Assertion(_) => ErrorKind::Assertion,
            Self::CommunicationTimeout(_) => ErrorKind::CommunicationTimeout,
            Self::Communication(_) => ErrorKind::Communication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Mechanism { source, .. } => source.kind(),
        }
    }

    /// Id of the mechanism the error is attributed to, if any.
    #[must_use]
    pub fn mechanism_id(&self) -> Option<&str> {
        match self {
            Self::Mechanism { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Status code of a remote deny decision, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authorization { status, .. } => *status,
            Self::Mechanism { source, .. } => source.status(),
            _ => None,
        }
    }

    #[must_use]
    pub fn denial_reason(&self) -> DenialReason {
        self.kind().denial_reason()
    }
}

impl ErrorKind {
    #[must_use]
    pub fn denial_reason(self) -> DenialReason {
        match self {
            Self::NoAuthDataPresent => DenialReason::CredentialsMissing,
            Self::InvalidFormat
            | Self::KeyResolution
            | Self::AlgorithmNotAllowed
            | Self::Verification
            | Self::Assertion => DenialReason::CredentialsInvalid,
            Self::Authorization => DenialReason::PolicyDenied,
            Self::CommunicationTimeout | Self::Communication => DenialReason::ServiceUnavailable,
            Self::Internal | Self::Configuration => DenialReason::Internal,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_mechanism_context() {
        let err = MechanismError::KeyResolution("ambiguous".to_owned()).with_mechanism("jwt");
        assert_eq!(err.kind(), ErrorKind::KeyResolution);
        assert_eq!(err.mechanism_id(), Some("jwt"));
        assert_eq!(
            err.to_string(),
            "mechanism 'jwt': key resolution failed: ambiguous"
        );
    }

    #[test]
    fn attribution_is_not_overwritten() {
        let err = MechanismError::NoAuthDataPresent
            .with_mechanism("inner")
            .with_mechanism("outer");
        assert_eq!(err.mechanism_id(), Some("inner"));
    }

    #[test]
    fn status_survives_wrapping() {
        let err = MechanismError::Authorization {
            reason: "forbidden".to_owned(),
            status: Some(403),
        }
        .with_mechanism("remote");
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn denial_reasons_distinguish_missing_invalid_and_denied() {
        assert_eq!(
            MechanismError::NoAuthDataPresent.denial_reason(),
            DenialReason::CredentialsMissing
        );
        assert_eq!(
            MechanismError::Assertion("aud".to_owned()).denial_reason(),
            DenialReason::CredentialsInvalid
        );
        assert_eq!(
            MechanismError::authorization("nope").denial_reason(),
            DenialReason::PolicyDenied
        );
        assert_eq!(
            MechanismError::CommunicationTimeout("slow".to_owned()).denial_reason(),
            DenialReason::ServiceUnavailable
        );
    }
}
