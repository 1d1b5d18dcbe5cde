//! Per-request state threaded through the mechanism pipeline.

use std::collections::BTreeMap;
use std::future::Future;

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DenialReason, ErrorKind, MechanismError};
use crate::request::Request;
use crate::subject::Subject;

/// Mutable state of a single request while its mechanisms run.
///
/// Owned by one request; mechanisms never share it between tasks.
#[derive(Debug)]
pub struct RequestContext {
    request: Request,
    subject: Option<Subject>,
    upstream_headers: HeaderMap,
    upstream_cookies: BTreeMap<String, String>,
    error: Option<MechanismError>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

/// What the upstream receives when the request is allowed.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub subject: Subject,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
}

/// Structured outcome of a denied request.
///
/// Carries the reason class and the responsible mechanism, never the raw
/// internal error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenialReason,
    pub kind: ErrorKind,
    pub mechanism: Option<String>,
    /// Status code returned by a remote policy endpoint, if any.
    pub status: Option<u16>,
}

impl From<&MechanismError> for Denial {
    fn from(err: &MechanismError) -> Self {
        Self {
            reason: err.denial_reason(),
            kind: err.kind(),
            mechanism: err.mechanism_id().map(ToOwned::to_owned),
            status: err.status(),
        }
    }
}

impl RequestContext {
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            subject: None,
            upstream_headers: HeaderMap::new(),
            upstream_cookies: BTreeMap::new(),
            error: None,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Ties the request to `token`; outbound calls abort once it fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets an absolute deadline for every outbound call of this request.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[must_use]
    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn subject_mut(&mut self) -> Option<&mut Subject> {
        self.subject.as_mut()
    }

    pub fn set_subject(&mut self, subject: Subject) {
        self.subject = Some(subject);
    }

    /// Queues a header for the upstream request. Repeated names accumulate.
    ///
    /// # Errors
    /// Returns [`MechanismError::Internal`] if the name or value is not a
    /// valid header token.
    pub fn add_header_for_upstream(&mut self, name: &str, value: &str) -> Result<(), MechanismError> {
        let header_name = HeaderName::try_from(name)
            .map_err(|e| MechanismError::Internal(format!("invalid upstream header name '{name}': {e}")))?;
        let header_value = HeaderValue::try_from(value)
            .map_err(|e| MechanismError::Internal(format!("invalid value for upstream header '{name}': {e}")))?;
        self.upstream_headers.append(header_name, header_value);
        Ok(())
    }

    /// Queues a header that is already known to be valid.
    pub fn append_upstream_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.upstream_headers.append(name, value);
    }

    pub fn add_cookie_for_upstream(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.upstream_cookies.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn upstream_headers(&self) -> &HeaderMap {
        &self.upstream_headers
    }

    #[must_use]
    pub fn upstream_cookies(&self) -> &BTreeMap<String, String> {
        &self.upstream_cookies
    }

    /// Records the terminal error of the request. The first one wins.
    pub fn set_error(&mut self, err: MechanismError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&MechanismError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs `operation` bounded by the request's cancellation and deadline.
    ///
    /// # Errors
    /// Cancellation yields [`MechanismError::Communication`], an elapsed
    /// deadline [`MechanismError::CommunicationTimeout`]; otherwise the
    /// operation's own result is returned.
    pub async fn bounded<T, F>(&self, what: &str, operation: F) -> Result<T, MechanismError>
    where
        F: Future<Output = Result<T, MechanismError>>,
    {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => {
                Err(MechanismError::Communication(format!("{what} canceled")))
            }
            () = expired => {
                Err(MechanismError::CommunicationTimeout(format!("{what} exceeded the request deadline")))
            }
            result = operation => result,
        }
    }

    /// Consumes the context into the upstream view or a structured denial.
    ///
    /// # Errors
    /// Returns a [`Denial`] if an error was recorded or no subject was
    /// established.
    pub fn finalize(self) -> Result<Upstream, Denial> {
        if let Some(err) = &self.error {
            return Err(Denial::from(err));
        }

        let Some(subject) = self.subject else {
            return Err(Denial {
                reason: DenialReason::Internal,
                kind: ErrorKind::Internal,
                mechanism: None,
                status: None,
            });
        };

        Ok(Upstream {
            subject,
            headers: self.upstream_headers,
            cookies: self.upstream_cookies,
        })
    }
}
