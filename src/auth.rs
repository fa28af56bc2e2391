//! Access-token storage and refresh.

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventDispatcher};
use crate::http::decode_response;
use crate::types::{
    Credentials, RefreshTokenRequest, TokenExpiredEvent, TokenRefreshEvent, TokenResponse,
};

/// Source of the bearer token used for Open API calls
pub trait CredentialStore: Send + Sync {
    /// Snapshot of the held credentials
    fn credentials(&self) -> BoxFuture<'_, Credentials>;

    /// The current access token
    fn access_token(&self) -> BoxFuture<'_, Result<String>>;

    /// Replace `stale`, the token the caller last used, and return the new one
    ///
    /// If the held token no longer equals `stale`, another caller already
    /// refreshed it and the held token is returned without a new grant.
    fn refresh<'a>(&'a self, stale: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// [`CredentialStore`] backed by the `/auth/v1/token` refresh grant
///
/// Refreshes are serialized on one lock. Callers that were rejected with the
/// same token share a single grant, and each grant emits `tokenRefresh`. A
/// refresh that cannot be performed emits `tokenExpired`.
pub struct TokenManager {
    credentials: Mutex<Credentials>,
    client_id: String,
    client_secret: String,
    token_url: String,
    client: reqwest::Client,
    dispatcher: EventDispatcher,
}

impl TokenManager {
    pub fn new(config: &ClientConfig, credentials: Credentials, dispatcher: EventDispatcher) -> Self {
        Self {
            credentials: Mutex::new(credentials),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: format!("{}/auth/v1/token", config.base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
            dispatcher,
        }
    }

    /// Replace the held credentials, e.g. after an interactive login
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock().await = credentials;
    }

    async fn refresh_locked(&self, credentials: &mut Credentials) -> Result<String> {
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            return Err(self.expired("no refresh token available"));
        };

        let body = RefreshTokenRequest::new(
            refresh_token,
            self.client_id.clone(),
            self.client_secret.clone(),
        );
        let response: TokenResponse = match self.request_token(&body).await {
            Ok(response) => response,
            Err(e) => return Err(self.expired(&format!("token refresh failed: {}", e))),
        };

        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(ChronoDuration::try_seconds)
            .map(|lifetime| Utc::now() + lifetime);

        credentials.access_token = response.access_token;
        if response.refresh_token.is_some() {
            credentials.refresh_token = response.refresh_token;
        }
        credentials.expires_at = expires_at;

        tracing::info!(expires_at = ?expires_at, "access token refreshed");
        self.dispatcher
            .emit(Event::TokenRefresh(TokenRefreshEvent { expires_at }));
        Ok(credentials.access_token.clone())
    }

    async fn request_token(&self, body: &RefreshTokenRequest) -> Result<TokenResponse> {
        let response = self.client.post(&self.token_url).json(body).send().await?;
        decode_response(response).await
    }

    fn expired(&self, reason: &str) -> Error {
        tracing::warn!(reason, "access token expired");
        self.dispatcher.emit(Event::TokenExpired(TokenExpiredEvent {
            reason: reason.to_string(),
        }));
        Error::Authorization(reason.to_string())
    }
}

impl CredentialStore for TokenManager {
    fn credentials(&self) -> BoxFuture<'_, Credentials> {
        Box::pin(async move { self.credentials.lock().await.clone() })
    }

    fn access_token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let credentials = self.credentials.lock().await;
            if credentials.access_token.is_empty() {
                return Err(Error::Authorization("no access token held".to_string()));
            }
            Ok(credentials.access_token.clone())
        })
    }

    fn refresh<'a>(&'a self, stale: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut credentials = self.credentials.lock().await;
            if !credentials.access_token.is_empty() && credentials.access_token != stale {
                tracing::debug!("access token already refreshed");
                return Ok(credentials.access_token.clone());
            }
            self.refresh_locked(&mut credentials).await
        })
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
