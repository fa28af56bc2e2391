use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::types::ChannelId;

/// Exchanges a channel id for a short-lived chat token
///
/// Called once per connection attempt; implementations must not cache
/// tokens across calls.
pub trait ChatTokenSource: Send + Sync {
    fn chat_access_token<'a>(&'a self, channel_id: &'a ChannelId) -> BoxFuture<'a, Result<String>>;
}
