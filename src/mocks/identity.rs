use crate::identity::{IdentityError, IdentityGrant, IdentityProvider};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity provider that answers every handshake with a scripted result.
#[derive(Clone)]
pub struct MockIdentity {
    result: Arc<Mutex<Result<IdentityGrant, IdentityError>>>,
}

impl Default for MockIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentity {
    pub fn new() -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(IdentityError::Unavailable))),
        }
    }

    pub fn set_result(&self, result: Result<IdentityGrant, IdentityError>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = result;
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn sign_in(&self) -> Result<IdentityGrant, IdentityError> {
        let result = self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tokio::task::yield_now().await;
        result
    }
}
