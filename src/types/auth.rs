use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::serde_helpers::optional_u64;

/// Access/refresh token pair held by a credential store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// When the access token expires, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Whether the access token expires within `threshold` of `now`
    ///
    /// A token with unknown expiry is never considered expiring.
    pub fn expires_within(&self, threshold: std::time::Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let threshold =
                    ChronoDuration::from_std(threshold).unwrap_or(ChronoDuration::MAX);
                expires_at - now <= threshold
            }
            None => false,
        }
    }
}

/// Body of a refresh-token grant
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub grant_type: &'static str,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl RefreshTokenRequest {
    pub fn new(refresh_token: String, client_id: String, client_secret: String) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token,
            client_id,
            client_secret,
        }
    }
}

/// Token endpoint payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default, deserialize_with = "optional_u64")]
    pub expires_in: Option<u64>,
}

/// Payload of a `tokenRefresh` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRefreshEvent {
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload of a `tokenExpired` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExpiredEvent {
    pub reason: String,
}
