//! Turns backend responses into typed results. This is the only place that
//! looks at error text; everything downstream matches on `SessionError`.

use crate::error::SessionError;
use crate::redact::redact_secrets;
use crate::types::{AuthGrant, ExternalSignIn, RegistrationResponse, TokenPair};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Register,
    VerifyEmail,
    ResendVerification,
    GoogleExchange,
    RefreshToken,
    CurrentUser,
    /// Any authorized call a screen makes.
    Resource,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/api/login",
            Self::Register => "/api/register",
            Self::VerifyEmail => "/api/verify-email",
            Self::ResendVerification => "/api/resend-verification",
            Self::GoogleExchange => "/api/auth/google",
            Self::RefreshToken => "/api/token/refresh",
            Self::CurrentUser => "/api/users/me",
            Self::Resource => "",
        }
    }

    /// Endpoints where a 401 means the stored credentials are no longer valid,
    /// as opposed to a rejected sign-in attempt.
    fn unauthorized_means_expired(self) -> bool {
        matches!(self, Self::RefreshToken | Self::CurrentUser | Self::Resource)
    }

    fn rejected_message(self) -> &'static str {
        match self {
            Self::Login => "Invalid email or password.",
            Self::Register => "Registration was rejected. Please check your details.",
            Self::VerifyEmail => "The verification code is invalid or has expired.",
            Self::ResendVerification => "Could not resend the verification email.",
            Self::GoogleExchange => "Google sign-in was rejected.",
            Self::RefreshToken | Self::CurrentUser | Self::Resource => "The request was rejected.",
        }
    }
}

const NO_ACCOUNT_SIGNATURES: [&str; 4] = [
    "please sign up first",
    "no account",
    "user not found",
    "user_not_found",
];

const ACCOUNT_EXISTS_SIGNATURES: [&str; 3] = ["already exists", "already registered", "already in use"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Array(items) => items.iter().find_map(first_string),
        Value::Object(obj) => obj.get("message").and_then(first_string),
        _ => None,
    }
}

fn parse_object(body: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Pulls a single human-readable message out of an error body:
/// `{detail}`, `{error}`, `{message}`, `{non_field_errors: [..]}` or the first
/// field-level array. HTML pages never produce a message.
pub fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return None;
    }

    let Some(obj) = parse_object(trimmed) else {
        if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.len() > 200 {
            return None;
        }
        return Some(redact_secrets(trimmed).into_owned());
    };

    let message = ["detail", "error", "message", "non_field_errors"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(first_string))
        .or_else(|| {
            obj.iter().find_map(|(field, value)| match value {
                Value::Array(_) => first_string(value).map(|msg| format!("{field}: {msg}")),
                _ => None,
            })
        })?;
    Some(redact_secrets(&message).into_owned())
}

fn email_from_body(body: &str) -> Option<String> {
    let obj = parse_object(body)?;
    obj.get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| s.contains('@'))
        .map(str::to_string)
}

/// Classifies a non-2xx response.
pub fn classify_failure(
    endpoint: Endpoint,
    status: u16,
    body: &str,
    email: Option<&str>,
) -> SessionError {
    let message = extract_message(body);

    if status >= 500 {
        return SessionError::Server {
            status,
            message: message
                .unwrap_or_else(|| "The server is unavailable. Please try again later.".to_string()),
        };
    }

    if status == 401 && endpoint.unauthorized_means_expired() {
        return SessionError::SessionExpired;
    }

    let signs_in = matches!(endpoint, Endpoint::Login | Endpoint::GoogleExchange);
    let no_account = signs_in
        && ((endpoint == Endpoint::GoogleExchange && status == 404)
            || message
                .as_deref()
                .is_some_and(|m| contains_any(m, &NO_ACCOUNT_SIGNATURES)));
    if no_account {
        return SessionError::NoAccount {
            email: email_from_body(body).or_else(|| email.map(str::to_string)),
        };
    }

    if endpoint == Endpoint::Register
        && (status == 409
            || message
                .as_deref()
                .is_some_and(|m| contains_any(m, &ACCOUNT_EXISTS_SIGNATURES)))
    {
        return SessionError::AccountExists {
            message: message
                .unwrap_or_else(|| "An account with this email already exists.".to_string()),
        };
    }

    match (endpoint, status) {
        (Endpoint::Resource | Endpoint::CurrentUser, 400..=499) => SessionError::Request {
            status,
            message: message.unwrap_or_else(|| endpoint.rejected_message().to_string()),
        },
        // A bare 404 on an auth endpoint is a routing problem, not a verdict on
        // the credentials.
        (_, 404) => SessionError::Request {
            status,
            message: message
                .unwrap_or_else(|| "The requested service was not found.".to_string()),
        },
        (_, 400..=499) => SessionError::AuthRejected {
            message: message.unwrap_or_else(|| endpoint.rejected_message().to_string()),
        },
        _ => SessionError::Server {
            status,
            message: message.unwrap_or_else(|| format!("Unexpected response status {status}.")),
        },
    }
}

fn malformed(status: u16) -> SessionError {
    SessionError::Server {
        status,
        message: "The server sent an unexpected response.".to_string(),
    }
}

pub fn decode_json<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, SessionError> {
    serde_json::from_str(body).map_err(|_| malformed(status))
}

#[derive(Deserialize)]
struct PendingBody {
    #[serde(default, alias = "requires_verification")]
    verification_required: bool,
    email: Option<String>,
    detail: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistrationBody {
    Session(AuthGrant),
    Pending(PendingBody),
}

/// A 2xx registration body carries either a token grant or a
/// verification-required indicator.
pub fn decode_registration(
    status: u16,
    body: &str,
    submitted_email: &str,
) -> Result<RegistrationResponse, SessionError> {
    match decode_json::<RegistrationBody>(status, body)? {
        RegistrationBody::Session(grant) => Ok(RegistrationResponse::Session(grant)),
        RegistrationBody::Pending(pending) => {
            let message = pending.detail.or(pending.message);
            if !pending.verification_required && message.is_none() && pending.email.is_none() {
                return Err(malformed(status));
            }
            Ok(RegistrationResponse::VerificationRequired {
                email: pending
                    .email
                    .unwrap_or_else(|| submitted_email.to_string()),
                message: message.map(|m| redact_secrets(&m).into_owned()),
            })
        }
    }
}

#[derive(Deserialize)]
struct SignupBody {
    #[serde(default, alias = "needs_registration")]
    needs_signup: bool,
    email: Option<String>,
    detail: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExternalBody {
    Session(AuthGrant),
    Signup(SignupBody),
}

pub fn decode_external_sign_in(status: u16, body: &str) -> Result<ExternalSignIn, SessionError> {
    match decode_json::<ExternalBody>(status, body)? {
        ExternalBody::Session(grant) => Ok(ExternalSignIn::Session(grant)),
        ExternalBody::Signup(signup) => {
            let flagged = signup.needs_signup
                || signup
                    .detail
                    .as_deref()
                    .is_some_and(|d| contains_any(d, &NO_ACCOUNT_SIGNATURES));
            if flagged {
                Ok(ExternalSignIn::NoAccount {
                    email: signup.email,
                })
            } else {
                Err(malformed(status))
            }
        }
    }
}

#[derive(Deserialize)]
struct RefreshBody {
    access: String,
    refresh: Option<String>,
}

/// Refresh responses may omit `refresh` when the backend does not rotate.
pub fn decode_refresh(status: u16, body: &str, previous_refresh: &str) -> Result<TokenPair, SessionError> {
    let parsed: RefreshBody = decode_json(status, body)?;
    Ok(TokenPair::new(
        parsed.access,
        parsed
            .refresh
            .unwrap_or_else(|| previous_refresh.to_string()),
    ))
}
