use super::decode::{
    classify_failure, decode_external_sign_in, decode_json, decode_refresh, decode_registration,
    Endpoint,
};
use super::AuthBackend;
use crate::error::SessionError;
use crate::redact::redact_secrets;
use crate::settings::Settings;
use crate::types::{AuthGrant, ExternalSignIn, RegisterPayload, RegistrationResponse, TokenPair, User};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const USER_AGENT_VALUE: &str = concat!("marketplace-session/", env!("CARGO_PKG_VERSION"));

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers
}

pub fn bearer_headers(access_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {access_token}")) {
        headers.insert(AUTHORIZATION, value);
    }
    headers
}

/// Maps a transport failure (nothing usable came back) to a retryable error.
pub fn map_transport_error(err: &reqwest::Error) -> SessionError {
    if err.is_timeout() {
        return SessionError::timed_out();
    }
    if err.is_connect() {
        return SessionError::network("Could not reach the server. Check your connection.");
    }
    SessionError::network(redact_secrets(&err.to_string()).into_owned())
}

pub struct MarketplaceApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarketplaceApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .default_headers(build_headers())
                .timeout(timeout)
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, reqwest::Error> {
        Self::new(&settings.api_base_url(), settings.request_timeout())
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Sends the request and returns `(status, body)` for 2xx responses;
    /// everything else is classified against `endpoint`.
    async fn execute(
        &self,
        endpoint: Endpoint,
        request: reqwest::RequestBuilder,
        email: Option<&str>,
    ) -> Result<(u16, String), SessionError> {
        let res = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        let status = res.status().as_u16();
        let success = res.status().is_success();
        let text = res.text().await.map_err(|e| map_transport_error(&e))?;

        if !success {
            let err = classify_failure(endpoint, status, &text, email);
            debug!(?endpoint, status, error = %err, "backend call failed");
            return Err(err);
        }
        Ok((status, text))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        body: &B,
        email: Option<&str>,
    ) -> Result<(u16, String), SessionError> {
        let request = self.http.post(self.url(endpoint)).json(body);
        self.execute(endpoint, request, email).await
    }
}

#[async_trait]
impl AuthBackend for MarketplaceApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, SessionError> {
        let (status, text) = self
            .post(
                Endpoint::Login,
                &json!({ "email": email, "password": password }),
                Some(email),
            )
            .await?;
        decode_json(status, &text)
    }

    async fn register(&self, payload: &RegisterPayload) -> Result<RegistrationResponse, SessionError> {
        let (status, text) = self
            .post(Endpoint::Register, payload, Some(&payload.email))
            .await?;
        decode_registration(status, &text, &payload.email)
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<AuthGrant, SessionError> {
        let (status, text) = self
            .post(
                Endpoint::VerifyEmail,
                &json!({ "email": email, "code": code }),
                Some(email),
            )
            .await?;
        decode_json(status, &text)
    }

    async fn resend_verification(&self, email: &str) -> Result<(), SessionError> {
        self.post(
            Endpoint::ResendVerification,
            &json!({ "email": email }),
            Some(email),
        )
        .await?;
        Ok(())
    }

    async fn exchange_google_token(
        &self,
        id_token: &str,
        email: Option<&str>,
    ) -> Result<ExternalSignIn, SessionError> {
        let result = self
            .post(Endpoint::GoogleExchange, &json!({ "id_token": id_token }), email)
            .await;
        match result {
            Ok((status, text)) => match decode_external_sign_in(status, &text)? {
                ExternalSignIn::NoAccount { email: None } => Ok(ExternalSignIn::NoAccount {
                    email: email.map(str::to_string),
                }),
                other => Ok(other),
            },
            Err(SessionError::NoAccount { email }) => Ok(ExternalSignIn::NoAccount { email }),
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let (status, text) = self
            .post(
                Endpoint::RefreshToken,
                &json!({ "refresh": refresh_token }),
                None,
            )
            .await?;
        decode_refresh(status, &text, refresh_token)
    }

    async fn current_user(&self, access_token: &str) -> Result<User, SessionError> {
        let request = self
            .http
            .get(self.url(Endpoint::CurrentUser))
            .headers(bearer_headers(access_token));
        let (status, text) = self.execute(Endpoint::CurrentUser, request, None).await?;
        decode_json(status, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_headers_carry_token() {
        let headers = bearer_headers("abc");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn bearer_headers_skip_invalid_values() {
        assert!(bearer_headers("bad\ntoken").get(AUTHORIZATION).is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = MarketplaceApiClient::new("https://api.test/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url(Endpoint::Login), "https://api.test/api/login");
    }
}
