mod client;
pub mod decode;

pub use client::{bearer_headers, map_transport_error, MarketplaceApiClient};
pub use decode::Endpoint;

use crate::error::SessionError;
use crate::types::{AuthGrant, ExternalSignIn, RegisterPayload, RegistrationResponse, TokenPair, User};
use async_trait::async_trait;

/// The backend calls the session manager depends on.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, SessionError>;

    async fn register(&self, payload: &RegisterPayload) -> Result<RegistrationResponse, SessionError>;

    async fn verify_email(&self, email: &str, code: &str) -> Result<AuthGrant, SessionError>;

    async fn resend_verification(&self, email: &str) -> Result<(), SessionError>;

    /// `email` is what the identity provider reported, used when the backend
    /// does not echo it in a no-account answer.
    async fn exchange_google_token(
        &self,
        id_token: &str,
        email: Option<&str>,
    ) -> Result<ExternalSignIn, SessionError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError>;

    async fn current_user(&self, access_token: &str) -> Result<User, SessionError>;
}
