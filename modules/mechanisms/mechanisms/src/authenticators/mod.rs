//! Built-in authenticators.

mod anonymous;
pub mod jwt;

pub use anonymous::AnonymousAuthenticator;
pub use jwt::JwtAuthenticator;

/// Kind name of [`AnonymousAuthenticator`].
pub const ANONYMOUS: &str = "anonymous";
/// Kind name of [`JwtAuthenticator`].
pub const JWT: &str = "jwt";
