use super::session_bus::SessionBus;
use super::token_store::{
    TokenStore, KEY_ACCESS_TOKEN, KEY_PENDING_EMAIL, KEY_REFRESH_TOKEN, KEY_USER,
};
use crate::api::AuthBackend;
use crate::error::{SessionError, StoreError};
use crate::identity::IdentityProvider;
use crate::types::{
    ActiveSession, AuthGrant, ExternalSignIn, OperationOutcome, RegisterPayload,
    RegistrationOutcome, RegistrationResponse, SessionSnapshot, SessionStatus, TokenPair, User,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

struct Inner {
    store: Arc<dyn TokenStore>,
    backend: Arc<dyn AuthBackend>,
    identity: Arc<dyn IdentityProvider>,
    bus: SessionBus,
    /// Serialises persist-then-publish and claim-then-delete sequences.
    persist: Mutex<()>,
}

/// Owns the authentication state. Cheap to clone; every clone is a handle to
/// the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        backend: Arc<dyn AuthBackend>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                identity,
                bus: SessionBus::new(),
                persist: Mutex::new(()),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.bus.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.bus.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.bus.read(|s| s.status)
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .bus
            .read(|s| s.tokens().map(|t| t.access_token.clone()))
    }

    /// Current access token with the epoch it belongs to.
    pub(crate) fn bearer(&self) -> Option<(String, u64)> {
        self.inner
            .bus
            .read(|s| s.tokens().map(|t| (t.access_token.clone(), s.epoch)))
    }

    fn fail<T>(&self, err: SessionError) -> OperationOutcome<T> {
        self.inner.bus.update(|s| s.error = Some(err.clone()));
        OperationOutcome::Failed(err)
    }

    async fn persist_session(&self, session: &ActiveSession) -> Result<(), StoreError> {
        let store = &self.inner.store;
        // Refresh first: an access token without its refresh token is useless.
        store
            .set(KEY_REFRESH_TOKEN, &session.tokens.refresh_token)
            .await?;
        store
            .set(KEY_ACCESS_TOKEN, &session.tokens.access_token)
            .await?;
        let user = serde_json::to_string(&session.user)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        store.set(KEY_USER, &user).await
    }

    /// Deletes every session key, attempting all of them before reporting the
    /// first failure.
    async fn wipe_store(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER] {
            if let Err(e) = self.inner.store.delete(key).await {
                warn!(key, error = %e, "failed to delete session key");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Persists, then publishes. A failed persist leaves no half-written
    /// session behind in either place.
    async fn adopt(&self, session: ActiveSession) -> Result<(), SessionError> {
        let _guard = self.inner.persist.lock().await;
        if let Err(e) = self.persist_session(&session).await {
            warn!(error = %e, "failed to persist session");
            let _ = self.wipe_store().await;
            let err = SessionError::from(e);
            self.inner.bus.update(|s| s.clear(Some(err.clone())));
            return Err(err);
        }
        let user_id = session.user.id;
        self.inner.bus.update(|s| s.adopt(session));
        info!(user_id, "session authenticated");
        Ok(())
    }

    async fn finish_with_grant(&self, grant: AuthGrant) -> OperationOutcome<User> {
        let user = grant.user.clone();
        match self.adopt(grant.into()).await {
            Ok(()) => OperationOutcome::Completed(user),
            Err(e) => OperationOutcome::Failed(e),
        }
    }

    /// Restores the session from the token store. Only acts once, from
    /// `Uninitialized`; later calls report the current status.
    pub async fn initialize(&self) -> OperationOutcome<SessionStatus> {
        let Some(_op) = self.inner.bus.try_begin() else {
            return OperationOutcome::Busy;
        };
        let started = self.inner.bus.update_if(|s| {
            if s.status != SessionStatus::Uninitialized {
                return false;
            }
            s.status = SessionStatus::Initializing;
            true
        });
        if !started {
            return OperationOutcome::Completed(self.status());
        }

        let stored = async {
            let store = &self.inner.store;
            Ok::<_, StoreError>((
                store.get(KEY_ACCESS_TOKEN).await?,
                store.get(KEY_REFRESH_TOKEN).await?,
                store.get(KEY_USER).await?,
            ))
        }
        .await;

        let (access, refresh, user) = match stored {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "could not read stored session");
                let err = SessionError::from(e);
                self.inner.bus.update(|s| s.clear(Some(err.clone())));
                return OperationOutcome::Failed(err);
            }
        };

        let (access, refresh) = match (access, refresh) {
            (Some(access), Some(refresh)) => (access, refresh),
            (None, None) => {
                self.inner.bus.update(|s| s.clear(None));
                info!("no stored session");
                return OperationOutcome::Completed(SessionStatus::Unauthenticated);
            }
            _ => {
                warn!("stored session is incomplete; discarding it");
                let _guard = self.inner.persist.lock().await;
                let _ = self.wipe_store().await;
                self.inner.bus.update(|s| s.clear(None));
                return OperationOutcome::Completed(SessionStatus::Unauthenticated);
            }
        };
        let tokens = TokenPair::new(access, refresh);

        let cached_user = user.and_then(|json| serde_json::from_str::<User>(&json).ok());
        if let Some(user) = cached_user {
            let user_id = user.id;
            self.inner.bus.update(|s| s.adopt(ActiveSession { user, tokens }));
            info!(user_id, "restored stored session");
            return OperationOutcome::Completed(SessionStatus::Authenticated);
        }

        match self.inner.backend.current_user(&tokens.access_token).await {
            Ok(user) => match self.adopt(ActiveSession { user, tokens }).await {
                Ok(()) => OperationOutcome::Completed(SessionStatus::Authenticated),
                Err(e) => OperationOutcome::Failed(e),
            },
            Err(SessionError::SessionExpired) => {
                info!("stored session was rejected by the server");
                let _guard = self.inner.persist.lock().await;
                let _ = self.wipe_store().await;
                self.inner.bus.update(|s| s.clear(None));
                OperationOutcome::Completed(SessionStatus::Unauthenticated)
            }
            Err(e) => {
                // Store is kept so the next start can try again.
                warn!(error = %e, "could not confirm stored session");
                self.inner.bus.update(|s| s.clear(Some(e.clone())));
                OperationOutcome::Failed(e)
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> OperationOutcome<User> {
        let Some(_op) = self.inner.bus.try_begin() else {
            debug!("login ignored: another session operation is in flight");
            return OperationOutcome::Busy;
        };

        match self.inner.backend.login(email, password).await {
            Ok(grant) => self.finish_with_grant(grant).await,
            Err(e) => {
                info!(error = %e, "login failed");
                self.fail(e)
            }
        }
    }

    /// Forwards `payload` as given; field validation belongs to the form.
    pub async fn register(&self, payload: RegisterPayload) -> OperationOutcome<RegistrationOutcome> {
        let Some(_op) = self.inner.bus.try_begin() else {
            debug!("register ignored: another session operation is in flight");
            return OperationOutcome::Busy;
        };

        match self.inner.backend.register(&payload).await {
            Ok(RegistrationResponse::Session(grant)) => match self.finish_with_grant(grant).await {
                OperationOutcome::Completed(user) => {
                    OperationOutcome::Completed(RegistrationOutcome::Authenticated { user })
                }
                OperationOutcome::Failed(e) => OperationOutcome::Failed(e),
                OperationOutcome::Busy => OperationOutcome::Busy,
            },
            Ok(RegistrationResponse::VerificationRequired { email, message }) => {
                info!("registration accepted; email verification required");
                OperationOutcome::Completed(RegistrationOutcome::VerificationRequired {
                    email,
                    message,
                })
            }
            Err(e) => {
                info!(error = %e, "registration failed");
                self.fail(e)
            }
        }
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> OperationOutcome<User> {
        let Some(_op) = self.inner.bus.try_begin() else {
            return OperationOutcome::Busy;
        };

        match self.inner.backend.verify_email(email, code).await {
            Ok(grant) => self.finish_with_grant(grant).await,
            Err(e) => self.fail(e),
        }
    }

    /// Not session-mutating, so it does not take the in-flight slot.
    pub async fn resend_verification(&self, email: &str) -> OperationOutcome {
        match self.inner.backend.resend_verification(email).await {
            Ok(()) => OperationOutcome::Completed(()),
            Err(e) => self.fail(e),
        }
    }

    pub async fn login_with_google(&self) -> OperationOutcome<User> {
        let Some(_op) = self.inner.bus.try_begin() else {
            debug!("google sign-in ignored: another session operation is in flight");
            return OperationOutcome::Busy;
        };

        let identity = match self.inner.identity.sign_in().await {
            Ok(identity) => identity,
            Err(e) => {
                info!(error = %e, "google handshake did not complete");
                return self.fail(e.into());
            }
        };

        let exchanged = self
            .inner
            .backend
            .exchange_google_token(&identity.id_token, identity.email.as_deref())
            .await;
        match exchanged {
            Ok(ExternalSignIn::Session(grant)) => self.finish_with_grant(grant).await,
            Ok(ExternalSignIn::NoAccount { email }) => {
                let email = email.or(identity.email);
                // An attempt without an email must not leave an earlier one behind.
                let remembered = match &email {
                    Some(email) => self.inner.store.set(KEY_PENDING_EMAIL, email).await,
                    None => self.inner.store.delete(KEY_PENDING_EMAIL).await,
                };
                if let Err(e) = remembered {
                    warn!(error = %e, "failed to remember pending sign-up email");
                }
                info!("google account has no marketplace account yet");
                self.fail(SessionError::NoAccount { email })
            }
            Err(e) => self.fail(e),
        }
    }

    /// Idempotent: signing out with nothing stored succeeds.
    pub async fn logout(&self) -> OperationOutcome {
        let Some(_op) = self.inner.bus.try_begin() else {
            debug!("logout ignored: another session operation is in flight");
            return OperationOutcome::Busy;
        };

        let _guard = self.inner.persist.lock().await;
        let wiped = self.wipe_store().await;
        self.inner.bus.update(|s| s.clear(None));
        info!("signed out");

        match wiped {
            Ok(()) => OperationOutcome::Completed(()),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn clear_error(&self) {
        self.inner.bus.update_if(|s| s.error.take().is_some());
    }

    /// Adopts a session issued out of band (e.g. after code verification)
    /// without a network call.
    pub async fn set_tokens_directly(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: User,
    ) -> OperationOutcome {
        let Some(_op) = self.inner.bus.try_begin() else {
            return OperationOutcome::Busy;
        };

        let session = ActiveSession {
            user,
            tokens: TokenPair::new(access_token, refresh_token),
        };
        match self.adopt(session).await {
            Ok(()) => OperationOutcome::Completed(()),
            Err(e) => OperationOutcome::Failed(e),
        }
    }

    /// Exchanges the refresh token for a new pair. A rejected refresh token
    /// ends the session; network and server failures do not.
    pub async fn refresh(&self) -> OperationOutcome {
        let Some(_op) = self.inner.bus.try_begin() else {
            return OperationOutcome::Busy;
        };

        let current = self.inner.bus.read(|s| {
            s.session
                .as_ref()
                .map(|session| (session.clone(), s.epoch))
        });
        let Some((session, epoch)) = current else {
            return self.fail(SessionError::NotAuthenticated);
        };

        match self
            .inner
            .backend
            .refresh(&session.tokens.refresh_token)
            .await
        {
            Ok(tokens) => {
                if self.inner.bus.read(|s| s.epoch != epoch || !s.is_authenticated()) {
                    return self.fail(SessionError::SessionExpired);
                }
                let refreshed = ActiveSession {
                    user: session.user,
                    tokens,
                };
                match self.adopt(refreshed).await {
                    Ok(()) => {
                        debug!("access token refreshed");
                        OperationOutcome::Completed(())
                    }
                    Err(e) => OperationOutcome::Failed(e),
                }
            }
            Err(SessionError::SessionExpired | SessionError::AuthRejected { .. }) => {
                self.expire(epoch).await;
                OperationOutcome::Failed(SessionError::SessionExpired)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Reads the email left by a failed external sign-in, then forgets it.
    pub async fn take_pending_email(&self) -> Option<String> {
        let email = match self.inner.store.get(KEY_PENDING_EMAIL).await {
            Ok(email) => email?,
            Err(e) => {
                warn!(error = %e, "could not read pending sign-up email");
                return None;
            }
        };
        if let Err(e) = self.inner.store.delete(KEY_PENDING_EMAIL).await {
            warn!(error = %e, "could not clear pending sign-up email");
        }
        Some(email)
    }

    /// Forced sign-out after a 401. Only the first call for a given epoch
    /// acts; returns whether this call performed the transition.
    pub async fn expire(&self, epoch: u64) -> bool {
        let _guard = self.inner.persist.lock().await;
        let claimed = self.inner.bus.update_if(|s| {
            if s.status != SessionStatus::Authenticated || s.epoch != epoch {
                return false;
            }
            s.clear(Some(SessionError::SessionExpired));
            true
        });
        if !claimed {
            debug!(epoch, "ignoring unauthorized response for a session that already ended");
            return false;
        }

        warn!(epoch, "session expired; signing out");
        if let Err(e) = self.wipe_store().await {
            warn!(error = %e, "failed to delete expired tokens");
        }
        true
    }
}
