mod session_bus;
mod session_manager;
mod token_store;

pub use session_bus::SessionBus;
pub use session_manager::SessionManager;
pub use token_store::{
    KeyringTokenStore, MemoryTokenStore, TokenStore, KEY_ACCESS_TOKEN, KEY_PENDING_EMAIL,
    KEY_REFRESH_TOKEN, KEY_USER,
};
