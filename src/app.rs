use crate::api::MarketplaceApiClient;
use crate::authorized::AuthorizedClient;
use crate::identity::IdentityProvider;
use crate::settings::{Settings, SettingsError};
use crate::state::{KeyringTokenStore, MemoryTokenStore, SessionManager, TokenStore};
use crate::types::{OperationOutcome, SessionStatus};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "marketplace_session=info";

#[derive(Debug, Error)]
pub enum SetupError {
  #[error(transparent)]
  Settings(#[from] SettingsError),
  #[error("failed to build HTTP client: {0}")]
  Http(#[from] reqwest::Error),
}

/// Installs a fmt subscriber filtered by `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .try_init();
}

/// Everything a UI shell needs: the session and a client for authorized calls.
#[derive(Clone)]
pub struct SessionRuntime {
  pub settings: Settings,
  pub session: SessionManager,
  pub api: AuthorizedClient,
}

fn token_store(settings: &Settings) -> Arc<dyn TokenStore> {
  let keyring = KeyringTokenStore::new(settings.keyring_service());
  if keyring.is_available() {
    return Arc::new(keyring);
  }
  warn!("OS keychain unavailable; session will not survive a restart");
  Arc::new(MemoryTokenStore::new())
}

pub fn build(
  settings: Settings,
  identity: Arc<dyn IdentityProvider>,
) -> Result<SessionRuntime, SetupError> {
  let store = token_store(&settings);
  build_with_store(settings, store, identity)
}

pub fn build_with_store(
  settings: Settings,
  store: Arc<dyn TokenStore>,
  identity: Arc<dyn IdentityProvider>,
) -> Result<SessionRuntime, SetupError> {
  let client = MarketplaceApiClient::from_settings(&settings)?;
  let api_base_url = client.base_url().to_string();
  let backend = Arc::new(client);
  let session = SessionManager::new(store, backend.clone(), identity);
  let api = AuthorizedClient::new(&backend, session.clone());

  info!(api_base_url = %api_base_url, "session runtime ready");
  Ok(SessionRuntime {
    settings,
    session,
    api,
  })
}

async fn restore(runtime: SessionRuntime) -> SessionRuntime {
  match runtime.session.initialize().await {
    OperationOutcome::Completed(SessionStatus::Authenticated) => info!("resumed stored session"),
    OperationOutcome::Completed(_) | OperationOutcome::Busy => {}
    OperationOutcome::Failed(e) => warn!(error = %e, "could not restore session"),
  }
  runtime
}

/// Builds the runtime and restores any stored session. A failed restore is
/// recorded on the session, not returned: the app still starts signed out.
pub async fn bootstrap(
  settings: Settings,
  identity: Arc<dyn IdentityProvider>,
) -> Result<SessionRuntime, SetupError> {
  Ok(restore(build(settings, identity)?).await)
}

pub async fn bootstrap_with_store(
  settings: Settings,
  store: Arc<dyn TokenStore>,
  identity: Arc<dyn IdentityProvider>,
) -> Result<SessionRuntime, SetupError> {
  Ok(restore(build_with_store(settings, store, identity)?).await)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::identity::UnavailableIdentityProvider;
  use serde_json::json;

  #[tokio::test]
  async fn build_with_memory_store_starts_uninitialized() {
    let settings = Settings::from_value(json!({ "apiBaseUrl": "http://127.0.0.1:9" })).unwrap();
    let runtime = build_with_store(
      settings,
      Arc::new(MemoryTokenStore::new()),
      Arc::new(UnavailableIdentityProvider),
    )
    .unwrap();

    assert_eq!(runtime.session.status(), SessionStatus::Uninitialized);
    assert_eq!(
      runtime.session.initialize().await,
      OperationOutcome::Completed(SessionStatus::Unauthenticated)
    );
  }

  #[tokio::test]
  async fn bootstrap_without_stored_session_starts_signed_out() {
    init_tracing();
    init_tracing();
    let settings = Settings::from_value(json!({
      "apiBaseUrl": "http://127.0.0.1:9",
      "keyringService": format!("marketplace-session-test-{}", std::process::id()),
    }))
    .unwrap();

    let runtime = bootstrap(settings, Arc::new(UnavailableIdentityProvider))
      .await
      .unwrap();

    assert_eq!(runtime.session.status(), SessionStatus::Unauthenticated);
    assert!(!runtime.session.snapshot().is_loading);
  }

  #[test]
  fn bad_settings_file_is_a_setup_error() {
    let err: SetupError = SettingsError::NotAnObject("x.json".into()).into();
    assert!(err.to_string().contains("x.json"));
  }
}
