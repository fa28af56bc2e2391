use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_helpers::optional_timestamp;
use super::ChannelId;

/// Envelope every Open API response is wrapped in
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub content: Option<T>,
}

/// `GET /open/v1/chats/access-token` content
///
/// `access_token` is optional so that its absence can be reported as a
/// protocol error rather than a JSON error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAccessTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// The user that owns the access token
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub channel_id: ChannelId,
    pub channel_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: ChannelId,
    pub channel_name: String,
    #[serde(default)]
    pub channel_image_url: Option<String>,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub verified_mark: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsResponse {
    #[serde(default)]
    pub data: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Live {
    pub live_id: u64,
    pub live_title: String,
    #[serde(default)]
    pub live_thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub concurrent_user_count: u64,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub open_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category_type: Option<String>,
    #[serde(default)]
    pub live_category: Option<String>,
    #[serde(default)]
    pub live_category_value: Option<String>,
    pub channel_id: ChannelId,
    pub channel_name: String,
    #[serde(default)]
    pub channel_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub next: Option<String>,
}

/// One page of live broadcasts
#[derive(Debug, Clone, Deserialize)]
pub struct LivesResponse {
    #[serde(default)]
    pub data: Vec<Live>,
    #[serde(default)]
    pub page: Page,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChatResponse {
    pub message_id: String,
}
