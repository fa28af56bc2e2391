use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::ChannelId;

/// A chat line (`chatMessage`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageEvent {
    pub channel_id: ChannelId,
    pub user_id: String,
    pub nickname: String,
    pub message: String,
    /// Badge descriptors as sent by the server; empty when absent
    pub badges: Vec<serde_json::Value>,
    /// Server timestamp, or the time the frame was received
    pub timestamp: DateTime<Utc>,
}

/// A donation (`chatDonation`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationEvent {
    pub channel_id: ChannelId,
    pub user_id: String,
    pub nickname: String,
    pub message: String,
    pub amount: Decimal,
    /// ISO currency code, "KRW" when absent
    pub currency: String,
    pub is_anonymous: bool,
    pub timestamp: DateTime<Utc>,
}

/// A paid subscription (`chatSubscription`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub channel_id: ChannelId,
    pub user_id: String,
    pub nickname: String,
    pub message: String,
    pub months: u32,
    pub tier: u32,
    pub tier_name: String,
    pub timestamp: DateTime<Utc>,
}

/// A channel notice (`chatNotice`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeEvent {
    pub channel_id: ChannelId,
    pub message: String,
    pub notice_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `chatConnected`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedEvent {
    pub channel_id: ChannelId,
}

/// Payload of `chatDisconnected`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectedEvent {
    pub channel_id: ChannelId,
    /// Close code reported by the transport, if any
    pub code: Option<u16>,
    pub reason: String,
    /// The close was requested through `disconnect()` or a replacing `connect()`
    pub requested: bool,
    /// Another connection attempt has been scheduled
    pub reconnecting: bool,
}

impl DisconnectedEvent {
    /// No further reconnection will happen without a new `connect()`
    pub fn is_terminal(&self) -> bool {
        !self.reconnecting
    }
}

/// Payload of `chatError`
#[derive(Debug, Clone)]
pub struct ChatErrorEvent {
    pub channel_id: Option<ChannelId>,
    /// Rendered error
    pub message: String,
    /// Raw inbound payload when the error came from an unparseable frame
    pub raw: Option<String>,
}
