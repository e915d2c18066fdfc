//! External (Google) sign-in handshake seam.
//!
//! The platform browser / identity SDK lives in the UI shell. The session
//! manager only needs an identity token back, so the handshake is modelled as
//! a request the shell answers over a oneshot channel.

use crate::error::SessionError;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct IdentityGrant {
    pub id_token: String,
    pub email: Option<String>,
}

impl fmt::Debug for IdentityGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityGrant")
            .field("id_token", &"REDACTED")
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Google sign-in was cancelled.")]
    Cancelled,
    #[error("Google sign-in failed: {0}")]
    Failed(String),
    #[error("Google sign-in is not available on this device.")]
    Unavailable,
}

impl From<IdentityError> for SessionError {
    fn from(err: IdentityError) -> Self {
        Self::ExternalSignIn {
            cancelled: err == IdentityError::Cancelled,
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<IdentityGrant, IdentityError>;
}

/// For builds without an external identity provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableIdentityProvider;

#[async_trait]
impl IdentityProvider for UnavailableIdentityProvider {
    async fn sign_in(&self) -> Result<IdentityGrant, IdentityError> {
        Err(IdentityError::Unavailable)
    }
}

pub struct SignInRequest {
    pub respond_to: oneshot::Sender<Result<IdentityGrant, IdentityError>>,
}

/// Forwards each handshake to the UI shell, which runs the browser flow and
/// answers on `respond_to`. Dropping the responder counts as a cancel.
#[derive(Clone)]
pub struct ChannelIdentityProvider {
    tx: mpsc::UnboundedSender<SignInRequest>,
}

impl ChannelIdentityProvider {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignInRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl IdentityProvider for ChannelIdentityProvider {
    async fn sign_in(&self) -> Result<IdentityGrant, IdentityError> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SignInRequest { respond_to: tx }).is_err() {
            return Err(IdentityError::Unavailable);
        }
        rx.await.unwrap_or(Err(IdentityError::Cancelled))
    }
}
