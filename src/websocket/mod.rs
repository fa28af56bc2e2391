//! Realtime chat over WebSocket.
//!
//! [`ChatSession`] owns at most one transport to the chat server. It
//! authenticates with a short-lived chat token, keeps the link alive with a
//! `PING` heartbeat, and reconnects with exponential backoff when the server
//! drops the connection.
//!
//! # Connection Management
//!
//! Unexpected closures are retried according to [`ReconnectConfig`] (2s, 4s,
//! 8s, 16s, 32s by default). Once the budget is spent a terminal
//! `chatDisconnected` is emitted and the session returns to
//! [`ChatState::Idle`]. A fresh chat token is fetched for every attempt.
//!
//! The transport is abstracted behind [`Connector`] so sessions can be driven
//! by something other than [`TungsteniteConnector`].

mod backoff;
mod frame;
mod session;
mod token;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use backoff::ReconnectConfig;
pub use frame::{
    ChatFrame, DonationFrame, InboundFrame, NoticeFrame, OutboundFrame, SubscriptionFrame,
};
pub use session::{ChatSession, ChatState, SessionConfig};
pub use token::ChatTokenSource;
pub use transport::{Connection, Connector, FrameSink, TransportEvent, TungsteniteConnector};
