use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::CredentialStore;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{
    Channel, ChannelId, ChannelsResponse, ChatAccessTokenResponse, LivesResponse,
    SendChatRequest, SendChatResponse, UserInfo,
};
use crate::websocket::ChatTokenSource;

/// Client for the Chzzk Open API REST endpoints
///
/// Every call goes through the token-refresh interceptor, so an access token
/// close to expiry is refreshed first and a `401` is retried once.
pub struct ApiClient {
    http_client: HttpClient,
}

impl ApiClient {
    /// Create a new ApiClient
    ///
    /// # Arguments
    /// * `base_url` - The base URL for the API (e.g., "https://openapi.chzzk.naver.com")
    /// * `credentials` - Source of the bearer token
    /// * `refresh_threshold` - Refresh the token when it expires within this window
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            http_client: HttpClient::new(base_url, credentials, refresh_threshold),
        }
    }

    /// Get a short-lived token for joining a channel's chat
    ///
    /// # Errors
    /// Returns [`Error::Protocol`] if the response carries no `accessToken`.
    pub async fn chat_access_token(&self, channel_id: &ChannelId) -> Result<String> {
        let response: ChatAccessTokenResponse = self
            .http_client
            .get(
                "/open/v1/chats/access-token",
                &[("channelId", channel_id.to_string())],
            )
            .await?;
        response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Protocol("chat token response has no accessToken".to_string()))
    }

    /// Get the user that owns the access token
    pub async fn get_me(&self) -> Result<UserInfo> {
        self.http_client.get("/open/v1/users/me", &[]).await
    }

    /// Get channel details for up to 20 channels
    pub async fn get_channels(&self, channel_ids: &[ChannelId]) -> Result<Vec<Channel>> {
        let ids: Vec<&str> = channel_ids.iter().map(|id| id.as_str()).collect();
        let response: ChannelsResponse = self
            .http_client
            .get("/open/v1/channels", &[("channelIds", ids.join(","))])
            .await?;
        Ok(response.data)
    }

    /// Get one page of live broadcasts
    ///
    /// # Arguments
    /// * `size` - Optional page size
    /// * `next` - Cursor from the previous page's `page.next`
    pub async fn get_lives(&self, size: Option<u32>, next: Option<&str>) -> Result<LivesResponse> {
        let mut query = Vec::new();
        if let Some(size) = size {
            query.push(("size", size.to_string()));
        }
        if let Some(next) = next {
            query.push(("next", next.to_string()));
        }
        self.http_client.get("/open/v1/lives", &query).await
    }

    /// Send a chat message as the token's user to their own channel
    pub async fn send_chat_message(&self, message: impl Into<String>) -> Result<SendChatResponse> {
        let body = SendChatRequest {
            message: message.into(),
        };
        self.http_client.post("/open/v1/chats/send", &body).await
    }
}

impl ChatTokenSource for ApiClient {
    fn chat_access_token<'a>(&'a self, channel_id: &'a ChannelId) -> BoxFuture<'a, Result<String>> {
        Box::pin(ApiClient::chat_access_token(self, channel_id))
    }
}
