//! HTTP client for calls made on behalf of the signed-in user.
//!
//! Attaches the cached access token and turns a 401 into a forced sign-out of
//! the session the request was sent under.

use crate::api::decode::{classify_failure, decode_json, Endpoint};
use crate::api::{bearer_headers, map_transport_error, MarketplaceApiClient};
use crate::error::SessionError;
use crate::state::SessionManager;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionManager,
}

impl AuthorizedClient {
    /// Shares the connection pool and timeout of `api`.
    pub fn new(api: &MarketplaceApiClient, session: SessionManager) -> Self {
        Self {
            http: api.http().clone(),
            base_url: api.base_url().to_string(),
            session,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let (status, text) = self.execute(self.http.get(self.url(path))).await?;
        decode_json(status, &text)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)).json(body);
        let (status, text) = self.execute(request).await?;
        decode_json(status, &text)
    }

    pub async fn delete(&self, path: &str) -> Result<(), SessionError> {
        self.execute(self.http.delete(self.url(path))).await?;
        Ok(())
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(u16, String), SessionError> {
        let Some((access_token, epoch)) = self.session.bearer() else {
            return Err(SessionError::NotAuthenticated);
        };

        let res = request
            .headers(bearer_headers(&access_token))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        let status = res.status();

        if status == StatusCode::UNAUTHORIZED {
            if self.session.expire(epoch).await {
                warn!(epoch, "authorized request rejected; session ended");
            } else {
                debug!(epoch, "authorized request rejected after session already ended");
            }
            return Err(SessionError::SessionExpired);
        }

        let text = res.text().await.map_err(|e| map_transport_error(&e))?;
        if !status.is_success() {
            return Err(classify_failure(
                Endpoint::Resource,
                status.as_u16(),
                &text,
                None,
            ));
        }
        Ok((status.as_u16(), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UnavailableIdentityProvider;
    use crate::mocks::{MockBackend, RecordingTokenStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn client() -> AuthorizedClient {
        let api = MarketplaceApiClient::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
        let session = SessionManager::new(
            Arc::new(RecordingTokenStore::new()),
            Arc::new(MockBackend::new()),
            Arc::new(UnavailableIdentityProvider),
        );
        AuthorizedClient::new(&api, session)
    }

    #[test]
    fn paths_join_with_single_slash() {
        let client = client();
        assert_eq!(client.url("/api/listings"), "http://127.0.0.1:9/api/listings");
        assert_eq!(client.url("api/listings"), "http://127.0.0.1:9/api/listings");
    }

    #[tokio::test]
    async fn requests_without_session_are_refused_locally() {
        let err = client()
            .get_json::<serde_json::Value>("/api/listings")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotAuthenticated);
    }
}
