//! Prints a channel's chat feed until Ctrl-C.
//!
//! ```text
//! CHZZK_CLIENT_ID=... CHZZK_CLIENT_SECRET=... \
//! CHZZK_ACCESS_TOKEN=... CHZZK_REFRESH_TOKEN=... \
//! RUST_LOG=chzzk_rs=debug cargo run --example chat_feed -- <channel-id>
//! ```

use chzzk_rs::{ChzzkClient, ClientConfig, Credentials, Event, EventName};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let channel_id = std::env::args()
        .nth(1)
        .ok_or("usage: chat_feed <channel-id>")?;

    let config = ClientConfig::from_env()?;
    let credentials = Credentials::new(
        std::env::var("CHZZK_ACCESS_TOKEN")?,
        std::env::var("CHZZK_REFRESH_TOKEN").ok(),
        None,
    );
    let client = ChzzkClient::new(config, credentials);

    client.on(EventName::ChatConnected, |event| {
        if let Event::ChatConnected(e) = event {
            println!("Connected to {}", e.channel_id);
        }
    })?;
    client.on(EventName::ChatMessage, |event| {
        if let Event::ChatMessage(msg) = event {
            println!("[{}] {}: {}", msg.timestamp.format("%H:%M:%S"), msg.nickname, msg.message);
        }
    })?;
    client.on(EventName::ChatDonation, |event| {
        if let Event::ChatDonation(d) = event {
            let who = if d.is_anonymous { "anonymous" } else { d.nickname.as_str() };
            println!("  {} donated {} {}: {}", who, d.amount, d.currency, d.message);
        }
    })?;
    client.on(EventName::ChatSubscription, |event| {
        if let Event::ChatSubscription(s) = event {
            println!("  {} subscribed ({}, {} months)", s.nickname, s.tier_name, s.months);
        }
    })?;
    client.on("chatNotice", |event| {
        if let Event::ChatNotice(n) = event {
            println!("  [{}] {}", n.notice_type, n.message);
        }
    })?;
    client.on(EventName::ChatError, |event| {
        if let Event::ChatError(e) = event {
            eprintln!("Error: {}", e.message);
        }
    })?;
    client.on(EventName::ChatDisconnected, |event| {
        if let Event::ChatDisconnected(e) = event {
            println!(
                "Disconnected ({:?} {}){}",
                e.code,
                e.reason,
                if e.reconnecting { ", reconnecting" } else { "" }
            );
        }
    })?;
    client.on(EventName::TokenExpired, |event| {
        if let Event::TokenExpired(e) = event {
            eprintln!("Access token expired: {}", e.reason);
        }
    })?;

    client.connect(&channel_id).await?;
    tokio::signal::ctrl_c().await?;
    client.disconnect().await?;
    Ok(())
}
