//! Scriptable stand-ins for the session manager's collaborators.

pub mod backend;
pub mod identity;
pub mod store;

pub use backend::MockBackend;
pub use identity::MockIdentity;
pub use store::{RecordingTokenStore, StoreOp};
