//! # chzzk-rs
//!
//! A Rust client library for the Chzzk Open API and its realtime chat socket.
//!
//! This library provides a type-safe interface for:
//! - Realtime chat: messages, donations, subscriptions and notices
//! - Access-token management with proactive and on-`401` refresh
//! - Open API REST queries (users, channels, lives, sending chat)
//!
//! ## Features
//!
//! - **Event subscriptions**: `on` / `once` / `off` over a closed set of event names
//! - **Resilient chat**: heartbeat plus bounded exponential-backoff reconnection
//! - **Proper Error Handling**: No panics, one crate-wide error type
//! - **Decimal Precision**: Donation amounts as `rust_decimal::Decimal`
//!
//! The library logs through `tracing` and never installs a subscriber.

// Public modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod types;
pub mod websocket;

// Internal modules
mod http;

pub use auth::{CredentialStore, TokenManager};
pub use client::{ApiClient, ChzzkClient};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{Event, EventDispatcher, EventName, SubscriptionHandle, SubscriptionId};
pub use types::{ChannelId, Credentials};
pub use websocket::{ChatSession, ChatState, ReconnectConfig};
