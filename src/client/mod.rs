mod api;

pub use api::ApiClient;

use std::sync::Arc;

use crate::auth::{CredentialStore, TokenManager};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::{Event, EventDispatcher, IntoEventName, SubscriptionHandle, SubscriptionId};
use crate::types::Credentials;
use crate::websocket::{ChatSession, ChatState, Connector, SessionConfig, TungsteniteConnector};

/// Entry point: REST access plus one realtime chat session
///
/// All components share one [`EventDispatcher`], so token lifecycle events
/// and chat events arrive through the same subscriptions.
///
/// # Example
///
/// ```no_run
/// # use chzzk_rs::{ChzzkClient, ClientConfig, Credentials, Event, EventName};
/// # #[tokio::main]
/// # async fn main() -> chzzk_rs::Result<()> {
/// let config = ClientConfig::from_env()?;
/// let client = ChzzkClient::new(config, Credentials::new("access", Some("refresh".into()), None));
///
/// client.on(EventName::ChatMessage, |event| {
///     if let Event::ChatMessage(msg) = event {
///         println!("{}: {}", msg.nickname, msg.message);
///     }
/// })?;
/// client.connect("channel-id").await?;
/// # Ok(())
/// # }
/// ```
pub struct ChzzkClient {
    dispatcher: EventDispatcher,
    tokens: Arc<TokenManager>,
    api: Arc<ApiClient>,
    chat: ChatSession,
}

impl ChzzkClient {
    /// Create a client using a `tokio-tungstenite` transport
    pub fn new(config: ClientConfig, credentials: Credentials) -> Self {
        Self::with_connector(config, credentials, Arc::new(TungsteniteConnector::new()))
    }

    /// Create a client with a custom chat transport
    pub fn with_connector(
        config: ClientConfig,
        credentials: Credentials,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        let tokens = Arc::new(TokenManager::new(&config, credentials, dispatcher.clone()));
        let api = Arc::new(ApiClient::new(
            config.base_url.clone(),
            Arc::clone(&tokens) as Arc<dyn CredentialStore>,
            config.token_refresh_threshold,
        ));
        let chat = ChatSession::new(
            SessionConfig {
                chat_url: config.chat_url.clone(),
                heartbeat_interval: config.heartbeat_interval,
                reconnect: config.reconnect.clone(),
            },
            api.clone(),
            connector,
            dispatcher.clone(),
        );

        Self {
            dispatcher,
            tokens,
            api,
            chat,
        }
    }

    /// REST endpoints
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn chat_state(&self) -> ChatState {
        self.chat.state()
    }

    /// Connect chat to `channel_id`, replacing any current connection
    pub async fn connect(&self, channel_id: impl AsRef<str>) -> Result<()> {
        self.chat.connect(channel_id).await
    }

    /// Close chat and cancel any pending reconnect
    pub async fn disconnect(&self) -> Result<()> {
        self.chat.disconnect().await
    }

    /// Subscribe to an event by name
    ///
    /// Accepts an [`EventName`](crate::EventName) or its wire string such as
    /// `"chatMessage"`.
    pub fn on<N, F>(&self, name: N, handler: F) -> Result<SubscriptionHandle>
    where
        N: IntoEventName,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.on(name, handler)
    }

    /// Subscribe for a single delivery
    pub fn once<N, F>(&self, name: N, handler: F) -> Result<SubscriptionHandle>
    where
        N: IntoEventName,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.once(name, handler)
    }

    pub fn off<N: IntoEventName>(&self, name: N, id: SubscriptionId) -> Result<()> {
        self.dispatcher.off(name, id)
    }
}

impl std::fmt::Debug for ChzzkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChzzkClient")
            .field("tokens", &self.tokens)
            .field("chat", &self.chat)
            .finish_non_exhaustive()
    }
}
