//! Seam to the remote identity service.
//!
//! The session controller only talks to [`IdentityApi`]; [`HttpIdentityApi`] is
//! the production implementation. Every call receives the current token
//! explicitly so requests are always attributable to what the session store
//! holds at that moment.

mod error;
mod http;
mod types;

use secrecy::SecretString;
use std::future::Future;

pub use error::{ApiError, FieldErrors};
pub use http::HttpIdentityApi;
pub use types::{AuthPayload, LoginRequest, RegisterRequest, User};

pub trait IdentityApi: Send + Sync {
    /// Creates an account and returns the new identity with its token.
    fn register(
        &self,
        request: &RegisterRequest,
        token: Option<&SecretString>,
    ) -> impl Future<Output = Result<AuthPayload, ApiError>> + Send;

    /// Exchanges credentials for the identity and a token.
    fn login(
        &self,
        request: &LoginRequest,
        token: Option<&SecretString>,
    ) -> impl Future<Output = Result<AuthPayload, ApiError>> + Send;

    /// Invalidates the token on the server.
    fn logout(&self, token: &SecretString) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Resolves the identity owning `token`.
    fn current_user(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<User, ApiError>> + Send;
}
