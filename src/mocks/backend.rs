//! Mock auth backend with per-call scripted results.

use crate::api::AuthBackend;
use crate::error::SessionError;
use crate::types::{AuthGrant, ExternalSignIn, RegisterPayload, RegistrationResponse, TokenPair, User};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Script {
    login: Result<AuthGrant, SessionError>,
    register: Result<RegistrationResponse, SessionError>,
    verify: Result<AuthGrant, SessionError>,
    resend: Result<(), SessionError>,
    google: Result<ExternalSignIn, SessionError>,
    refresh: Result<TokenPair, SessionError>,
    current_user: Result<User, SessionError>,
    calls: Vec<&'static str>,
    login_emails: Vec<String>,
}

fn unscripted(call: &str) -> SessionError {
    SessionError::network(format!("mock backend: no result scripted for {call}"))
}

/// Every call yields once before answering so concurrent callers interleave.
#[derive(Clone)]
pub struct MockBackend {
    script: Arc<Mutex<Script>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                login: Err(unscripted("login")),
                register: Err(unscripted("register")),
                verify: Err(unscripted("verify_email")),
                resend: Ok(()),
                google: Err(unscripted("exchange_google_token")),
                refresh: Err(unscripted("refresh")),
                current_user: Err(unscripted("current_user")),
                calls: Vec::new(),
                login_emails: Vec::new(),
            })),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_login(&self, result: Result<AuthGrant, SessionError>) {
        self.script().login = result;
    }

    pub fn set_register(&self, result: Result<RegistrationResponse, SessionError>) {
        self.script().register = result;
    }

    pub fn set_verify(&self, result: Result<AuthGrant, SessionError>) {
        self.script().verify = result;
    }

    pub fn set_resend(&self, result: Result<(), SessionError>) {
        self.script().resend = result;
    }

    pub fn set_google(&self, result: Result<ExternalSignIn, SessionError>) {
        self.script().google = result;
    }

    pub fn set_refresh(&self, result: Result<TokenPair, SessionError>) {
        self.script().refresh = result;
    }

    pub fn set_current_user(&self, result: Result<User, SessionError>) {
        self.script().current_user = result;
    }

    /// How many times `call` (the trait method name) was invoked.
    pub fn call_count(&self, call: &str) -> usize {
        self.script().calls.iter().filter(|c| **c == call).count()
    }

    /// Emails passed to `login`, in call order.
    pub fn login_emails(&self) -> Vec<String> {
        self.script().login_emails.clone()
    }

    async fn answer<T: Clone>(
        &self,
        call: &'static str,
        pick: impl FnOnce(&Script) -> &Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let result = {
            let mut script = self.script();
            script.calls.push(call);
            pick(&script).clone()
        };
        tokio::task::yield_now().await;
        result
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn login(&self, email: &str, _password: &str) -> Result<AuthGrant, SessionError> {
        self.script().login_emails.push(email.to_string());
        self.answer("login", |s| &s.login).await
    }

    async fn register(&self, _payload: &RegisterPayload) -> Result<RegistrationResponse, SessionError> {
        self.answer("register", |s| &s.register).await
    }

    async fn verify_email(&self, _email: &str, _code: &str) -> Result<AuthGrant, SessionError> {
        self.answer("verify_email", |s| &s.verify).await
    }

    async fn resend_verification(&self, _email: &str) -> Result<(), SessionError> {
        self.answer("resend_verification", |s| &s.resend).await
    }

    async fn exchange_google_token(
        &self,
        _id_token: &str,
        _email: Option<&str>,
    ) -> Result<ExternalSignIn, SessionError> {
        self.answer("exchange_google_token", |s| &s.google).await
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, SessionError> {
        self.answer("refresh", |s| &s.refresh).await
    }

    async fn current_user(&self, _access_token: &str) -> Result<User, SessionError> {
        self.answer("current_user", |s| &s.current_user).await
    }
}
