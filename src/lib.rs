//! Client-side authentication and session management for the marketplace app.
//!
//! [`SessionManager`] owns the session state machine; [`AuthorizedClient`]
//! performs bearer-authenticated calls and ends the session on a 401.

pub mod api;
mod app;
pub mod authorized;
pub mod error;
pub mod identity;
#[cfg(any(test, feature = "test-support"))]
pub mod mocks;
pub mod redact;
pub mod settings;
pub mod state;
pub mod types;

pub use api::{AuthBackend, MarketplaceApiClient};
pub use app::{
    bootstrap, bootstrap_with_store, build, build_with_store, init_tracing, SessionRuntime,
    SetupError,
};
pub use authorized::AuthorizedClient;
pub use error::{SessionError, StoreError};
pub use identity::{ChannelIdentityProvider, IdentityProvider, UnavailableIdentityProvider};
pub use settings::Settings;
pub use state::{KeyringTokenStore, MemoryTokenStore, SessionManager, TokenStore};
pub use types::{
    OperationOutcome, RegisterPayload, RegistrationOutcome, SessionSnapshot, SessionStatus,
    TokenPair, User,
};
