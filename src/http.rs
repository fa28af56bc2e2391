use chrono::Utc;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::CredentialStore;
use crate::error::{Error, Result};
use crate::types::ApiResponse;

/// Paths under this prefix carry the bearer token
const AUTHENTICATED_PREFIX: &str = "/open/v1/";

/// HTTP client for the Open API
///
/// Authenticated requests are refreshed ahead of expiry and retried once
/// after a `401`.
pub(crate) struct HttpClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    refresh_threshold: Duration,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            credentials,
            refresh_threshold,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, &[], Some(&body)).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        if !path.starts_with(AUTHENTICATED_PREFIX) {
            let response = self.send(method, path, query, body, None).await?;
            return decode_response(response).await;
        }

        let token = self.bearer_token().await?;
        let response = self
            .send(method.clone(), path, query, body, Some(&token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode_response(response).await;
        }

        tracing::debug!(path, "access token rejected, refreshing");
        let token = self.credentials.refresh(&token).await?;
        let response = self.send(method, path, query, body, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::Authorization(format!(
                "{} rejected the refreshed access token",
                path
            )));
        }
        decode_response(response).await
    }

    /// Current token, refreshed first when it is about to expire
    async fn bearer_token(&self) -> Result<String> {
        let credentials = self.credentials.credentials().await;
        if credentials.expires_within(self.refresh_threshold, Utc::now()) {
            tracing::debug!(expires_at = ?credentials.expires_at, "refreshing access token ahead of expiry");
            return self.credentials.refresh(&credentials.access_token).await;
        }
        self.credentials.access_token().await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// Check the status and unwrap the `{code, message, content}` envelope
pub(crate) async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    text
                }
            });
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: ApiResponse<T> = serde_json::from_str(&text)?;
    envelope
        .content
        .ok_or_else(|| Error::Protocol("response envelope has no content".to_string()))
}
