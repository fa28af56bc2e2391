//! Chat socket wire frames.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::Event;
use crate::types::{
    lenient_array, lenient_bool, lenient_decimal, lenient_string, lenient_timestamp, lenient_u64,
    ChannelId, ChatMessageEvent, DonationEvent, NoticeEvent, SubscriptionEvent,
};

/// Client → server frame
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OutboundFrame<'a> {
    #[serde(rename_all = "camelCase")]
    Auth { token: &'a str, channel_id: &'a str },
    Ping,
}

impl OutboundFrame<'_> {
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server → client frame, discriminated by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InboundFrame {
    Chat(ChatFrame),
    Donation(DonationFrame),
    Subscription(SubscriptionFrame),
    Notice(NoticeFrame),
    Pong,
    /// Any type this client does not know about
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFrame {
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_id: Option<String>,
    pub user_id: String,
    pub nickname: String,
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_array")]
    pub badges: Option<Vec<serde_json::Value>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationFrame {
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default, alias = "message")]
    pub content: String,
    #[serde(default, alias = "payAmount", deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_anonymous: Option<bool>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFrame {
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_id: Option<String>,
    pub user_id: String,
    pub nickname: String,
    #[serde(default, alias = "message")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub months: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub tier: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tier_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeFrame {
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_id: Option<String>,
    #[serde(alias = "content")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notice_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboundFrame {
    /// Parse one text frame
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Normalize into a subscriber event, filling every optional field
    ///
    /// Returns `None` for frames that produce no event (`PONG`, unknown types).
    pub fn into_event(self, session_channel: &ChannelId, received_at: DateTime<Utc>) -> Option<Event> {
        let event = match self {
            InboundFrame::Chat(f) => Event::ChatMessage(ChatMessageEvent {
                channel_id: resolve_channel(f.channel_id, session_channel),
                user_id: f.user_id,
                nickname: f.nickname,
                message: f.content,
                badges: f.badges.unwrap_or_default(),
                timestamp: f.timestamp.unwrap_or(received_at),
            }),
            InboundFrame::Donation(f) => Event::ChatDonation(DonationEvent {
                channel_id: resolve_channel(f.channel_id, session_channel),
                user_id: f.user_id,
                nickname: f.nickname,
                message: f.content,
                amount: f.amount.unwrap_or_default(),
                currency: f.currency.unwrap_or_else(|| "KRW".to_string()),
                is_anonymous: f.is_anonymous.unwrap_or(false),
                timestamp: f.timestamp.unwrap_or(received_at),
            }),
            InboundFrame::Subscription(f) => Event::ChatSubscription(SubscriptionEvent {
                channel_id: resolve_channel(f.channel_id, session_channel),
                user_id: f.user_id,
                nickname: f.nickname,
                message: f.content,
                months: clamp_u32(f.months, 1),
                tier: clamp_u32(f.tier, 1),
                tier_name: f.tier_name.unwrap_or_else(|| "basic".to_string()),
                timestamp: f.timestamp.unwrap_or(received_at),
            }),
            InboundFrame::Notice(f) => Event::ChatNotice(NoticeEvent {
                channel_id: resolve_channel(f.channel_id, session_channel),
                message: f.message,
                notice_type: f.notice_type.unwrap_or_else(|| "NORMAL".to_string()),
                timestamp: f.timestamp.unwrap_or(received_at),
            }),
            InboundFrame::Pong | InboundFrame::Unknown => return None,
        };
        Some(event)
    }
}

fn resolve_channel(frame_channel: Option<String>, session_channel: &ChannelId) -> ChannelId {
    frame_channel
        .and_then(|id| ChannelId::new(id).ok())
        .unwrap_or_else(|| session_channel.clone())
}

fn clamp_u32(value: Option<u64>, default: u32) -> u32 {
    value
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(default)
}
