use serde::Serialize;
use thiserror::Error;

/// Failure of a session operation, classified once at the network or storage
/// boundary. Screens render `Display` and match on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    #[error("{message}")]
    AuthRejected { message: String },
    #[error("No account found for this sign-in. Please sign up first.")]
    NoAccount { email: Option<String> },
    #[error("{message}")]
    AccountExists { message: String },
    #[error("{message}")]
    Request { status: u16, message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("{message}")]
    Network { message: String, timed_out: bool },
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,
    #[error("You need to sign in first.")]
    NotAuthenticated,
    #[error("{message}")]
    ExternalSignIn { message: String, cancelled: bool },
    #[error("Secure storage error: {message}")]
    Storage { message: String },
}

impl SessionError {
    pub fn auth_rejected(message: impl Into<String>) -> Self {
        Self::AuthRejected {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timed_out() -> Self {
        Self::Network {
            message: "The request timed out. Please try again.".to_string(),
            timed_out: true,
        }
    }

    /// Whether the failure should push the user back to sign-in.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotAuthenticated)
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Server { .. })
    }

    pub fn is_no_account(&self) -> bool {
        matches!(self, Self::NoAccount { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("secure storage is unavailable")]
    Unavailable,
    #[error("secure storage rejected the write: {0}")]
    Write(String),
    #[error("secure storage read failed: {0}")]
    Read(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
