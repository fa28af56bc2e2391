//! Client configuration.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::websocket::ReconnectConfig;

/// Configuration shared by the REST client and the chat session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Open API (e.g. "https://openapi.chzzk.naver.com")
    pub base_url: String,
    /// URL of the realtime chat socket
    pub chat_url: String,
    /// Application client id
    pub client_id: String,
    /// Application client secret
    pub client_secret: String,
    /// Refresh the access token proactively when it expires within this window
    pub token_refresh_threshold: Duration,
    /// Interval between heartbeat PING frames
    pub heartbeat_interval: Duration,
    /// Reconnection policy for the chat session
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Default Open API base URL
    pub const DEFAULT_BASE_URL: &'static str = "https://openapi.chzzk.naver.com";

    /// Default chat socket URL
    pub const DEFAULT_CHAT_URL: &'static str = "wss://openapi.chzzk.naver.com/open/v1/chats/ws";

    /// Create a configuration with the given application credentials
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from the environment
    ///
    /// Reads `CHZZK_CLIENT_ID` and `CHZZK_CLIENT_SECRET` (required) and
    /// `CHZZK_API_URL` / `CHZZK_CHAT_URL` (optional overrides).
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("CHZZK_CLIENT_ID")
            .map_err(|_| Error::Config("CHZZK_CLIENT_ID is not set".to_string()))?;
        let client_secret = std::env::var("CHZZK_CLIENT_SECRET")
            .map_err(|_| Error::Config("CHZZK_CLIENT_SECRET is not set".to_string()))?;

        let mut config = Self::new(client_id, client_secret);
        if let Ok(url) = std::env::var("CHZZK_API_URL") {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var("CHZZK_CHAT_URL") {
            config.chat_url = url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chat_url(mut self, chat_url: impl Into<String>) -> Self {
        self.chat_url = chat_url.into();
        self
    }

    pub fn with_token_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.token_refresh_threshold = threshold;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            chat_url: Self::DEFAULT_CHAT_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            token_refresh_threshold: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}
