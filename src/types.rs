use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) fn now_iso() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub nickname: String,
}

/// Opaque bearer credentials. `Debug` never prints the token values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "access")]
    pub access_token: String,
    #[serde(rename = "refresh")]
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"REDACTED")
            .field("refresh_token", &"REDACTED")
            .finish()
    }
}

/// A token pair together with the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub nickname: String,
    pub password: String,
    pub password_confirm: String,
}

/// The two registration contracts the backend is known to answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationResponse {
    Session(AuthGrant),
    VerificationRequired {
        email: String,
        message: Option<String>,
    },
}

/// What a completed registration means for the caller's navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "next", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Authenticated { user: User },
    VerificationRequired {
        email: String,
        message: Option<String>,
    },
}

/// Result of exchanging an external identity token with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalSignIn {
    Session(AuthGrant),
    NoAccount { email: Option<String> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub user: User,
    pub tokens: TokenPair,
}

impl From<AuthGrant> for ActiveSession {
    fn from(grant: AuthGrant) -> Self {
        Self {
            user: grant.user,
            tokens: grant.tokens,
        }
    }
}

fn serialize_user_only<S>(session: &Option<ActiveSession>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    session.as_ref().map(|s| &s.user).serialize(serializer)
}

/// Point-in-time view of the session, as published to screens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    #[serde(rename = "user", serialize_with = "serialize_user_only")]
    pub(crate) session: Option<ActiveSession>,
    pub error: Option<SessionError>,
    pub is_loading: bool,
    #[serde(skip)]
    pub(crate) epoch: u64,
    pub changed_at: String,
}

impl SessionSnapshot {
    pub(crate) fn uninitialized() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            session: None,
            error: None,
            is_loading: false,
            epoch: 0,
            changed_at: now_iso(),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        self.session.as_ref().map(|s| &s.tokens)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub(crate) fn adopt(&mut self, session: ActiveSession) {
        self.status = SessionStatus::Authenticated;
        self.session = Some(session);
        self.error = None;
        self.epoch += 1;
        self.changed_at = now_iso();
    }

    pub(crate) fn clear(&mut self, error: Option<SessionError>) {
        self.status = SessionStatus::Unauthenticated;
        self.session = None;
        self.error = error;
        self.changed_at = now_iso();
    }
}

/// What a session-mutating call did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum OperationOutcome<T = ()> {
    Completed(T),
    Failed(SessionError),
    /// Another session-mutating operation was already in flight.
    Busy,
}

impl<T> OperationOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> AuthGrant {
        AuthGrant {
            tokens: TokenPair::new("x", "y"),
            user: User {
                id: 1,
                email: "a@b.com".to_string(),
                nickname: "abc".to_string(),
            },
        }
    }

    #[test]
    fn auth_grant_reads_flat_backend_shape() {
        let json = r#"{"access":"x","refresh":"y","user":{"id":1,"email":"a@b.com","nickname":"abc"}}"#;
        let parsed: AuthGrant = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, grant());
    }

    #[test]
    fn token_pair_debug_hides_values() {
        let out = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!out.contains("secret-access"));
        assert!(!out.contains("secret-refresh"));
    }

    #[test]
    fn adopt_and_clear_keep_user_and_tokens_together() {
        let mut snapshot = SessionSnapshot::uninitialized();
        snapshot.adopt(grant().into());
        assert!(snapshot.user().is_some() && snapshot.tokens().is_some());
        assert_eq!(snapshot.epoch, 1);

        snapshot.clear(Some(SessionError::SessionExpired));
        assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
        assert!(snapshot.user().is_none() && snapshot.tokens().is_none());
        assert_eq!(snapshot.epoch, 1);
    }

    #[test]
    fn snapshot_serializes_without_credentials() {
        let mut snapshot = SessionSnapshot::uninitialized();
        snapshot.adopt(grant().into());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "authenticated");
        assert_eq!(json["isLoading"], false);
        assert_eq!(json["user"]["nickname"], "abc");
        assert!(!json.to_string().contains("\"x\""));
    }
}
