#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Contracts shared by gatehouse access-control mechanisms.
//!
//! A request flows through authenticators, which establish a [`Subject`],
//! and then authorizers, which decide whether the subject may proceed. All
//! per-request state lives in a [`RequestContext`]; the outcome is either an
//! [`Upstream`] view or a structured [`Denial`].

pub mod api;
pub mod context;
pub mod error;
pub mod request;
pub mod subject;

pub use api::{Authenticator, Authorizer, is_empty_config};
pub use context::{Denial, RequestContext, Upstream};
pub use error::{DenialReason, ErrorKind, MechanismError};
pub use request::{AuthDataSource, Request};
pub use subject::Subject;
