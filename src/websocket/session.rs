use chrono::Utc;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::backoff::ReconnectConfig;
use super::frame::{InboundFrame, OutboundFrame};
use super::token::ChatTokenSource;
use super::transport::{Connection, Connector, FrameSink, TransportEvent};
use crate::error::{Error, Result};
use crate::events::{Event, EventDispatcher};
use crate::types::{ChannelId, ChatErrorEvent, ConnectedEvent, DisconnectedEvent};

/// Lifecycle state of a [`ChatSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// No transport
    Idle,
    /// Fetching a chat token and opening the transport
    Connecting,
    /// Transport open, auth frame being sent
    Authenticating,
    /// Heartbeat and dispatch active
    Connected,
    /// Caller-initiated teardown in progress
    Closing,
    /// Waiting for the backoff delay before the next attempt
    ReconnectPending,
}

/// Timing and retry settings for a [`ChatSession`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chat_url: String,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(chat_url: impl Into<String>) -> Self {
        Self {
            chat_url: chat_url.into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

enum LinkCommand {
    Close(oneshot::Sender<()>),
}

/// A running transport and the task driving it
struct Link {
    commands: mpsc::UnboundedSender<LinkCommand>,
    _task: JoinHandle<()>,
}

/// How a link driver finished
enum LinkEnd {
    /// Closed because the session asked it to
    Requested {
        ack: Option<oneshot::Sender<()>>,
        code: Option<u16>,
        reason: String,
    },
    /// Closed by the remote side or by a transport failure
    Dropped { code: Option<u16>, reason: String },
}

struct Session {
    epoch: u64,
    channel_id: ChannelId,
    reconnect_attempts: u32,
    link: Option<Link>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: SessionConfig,
    tokens: Arc<dyn ChatTokenSource>,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    session: Mutex<Option<Session>>,
    state: watch::Sender<ChatState>,
    epochs: AtomicU64,
}

/// Realtime chat connection to one channel at a time
///
/// Owns at most one transport. Inbound frames are classified and emitted
/// through the shared [`EventDispatcher`]. Unexpected closures are retried
/// with exponential backoff until the attempt budget runs out; the budget
/// resets only on an explicit [`connect`](Self::connect) or
/// [`disconnect`](Self::disconnect).
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(
        config: SessionConfig,
        tokens: Arc<dyn ChatTokenSource>,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state, _) = watch::channel(ChatState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                connector,
                dispatcher,
                session: Mutex::new(None),
                state,
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChatState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ChatState> {
        self.inner.state.subscribe()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Connect to `channel_id`, replacing any existing connection
    ///
    /// Fetches a fresh chat token, opens the transport, sends the auth frame
    /// and starts the heartbeat. Emits `chatConnected` once open.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `channel_id` is empty ([`Error::Config`])
    /// - The chat token cannot be fetched
    /// - The transport fails to open or the auth frame cannot be sent
    ///
    /// A failure here never schedules a reconnect.
    pub async fn connect(&self, channel_id: impl AsRef<str>) -> Result<()> {
        let channel_id = ChannelId::new(channel_id.as_ref())?;
        let inner = &self.inner;

        let mut guard = inner.session.lock().await;
        if let Some(previous) = guard.take() {
            inner.teardown(previous).await;
        }

        let epoch = inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        match inner.open_link(&channel_id, epoch).await {
            Ok(link) => {
                *guard = Some(Session {
                    epoch,
                    channel_id,
                    reconnect_attempts: 0,
                    link: Some(link),
                    reconnect_task: None,
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(channel_id = %channel_id, error = %e, "chat connect failed");
                inner.set_state(ChatState::Idle);
                Err(e)
            }
        }
    }

    /// Close the connection and cancel any pending reconnect
    ///
    /// Succeeds trivially when nothing is connected. Resolves once the
    /// transport has confirmed the close.
    pub async fn disconnect(&self) -> Result<()> {
        let mut guard = self.inner.session.lock().await;
        if let Some(session) = guard.take() {
            self.inner.teardown(session).await;
        }
        Ok(())
    }
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("chat_url", &self.inner.config.chat_url)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn set_state(&self, state: ChatState) {
        self.state.send_replace(state);
    }

    /// Fetch a token, open a transport, authenticate, and start its driver
    async fn open_link(self: &Arc<Self>, channel_id: &ChannelId, epoch: u64) -> Result<Link> {
        self.set_state(ChatState::Connecting);
        let token = self.tokens.chat_access_token(channel_id).await?;
        let Connection { mut sink, events } = self.connector.connect(&self.config.chat_url).await?;

        self.set_state(ChatState::Authenticating);
        let auth = OutboundFrame::Auth {
            token: &token,
            channel_id: channel_id.as_str(),
        }
        .to_text()?;
        if let Err(e) = sink.send(auth).await {
            let _ = sink.close().await;
            return Err(e);
        }

        self.set_state(ChatState::Connected);
        tracing::info!(channel_id = %channel_id, "chat connected");
        self.dispatcher.emit(Event::ChatConnected(ConnectedEvent {
            channel_id: channel_id.clone(),
        }));

        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive_link(
            Arc::downgrade(self),
            self.dispatcher.clone(),
            epoch,
            channel_id.clone(),
            self.config.heartbeat_interval,
            sink,
            events,
            command_rx,
        ));
        Ok(Link {
            commands,
            _task: task,
        })
    }

    /// Cancel the pending reconnect and close the link, waiting for the close
    async fn teardown(&self, mut session: Session) {
        if let Some(task) = session.reconnect_task.take() {
            task.abort();
        }

        if let Some(link) = session.link.take() {
            self.set_state(ChatState::Closing);
            let (ack, confirmed) = oneshot::channel();
            if link.commands.send(LinkCommand::Close(ack)).is_ok() {
                // Err means the link closed on its own before seeing the request
                let _ = confirmed.await;
            }
        }

        tracing::debug!(channel_id = %session.channel_id, "chat session torn down");
        self.set_state(ChatState::Idle);
    }

    /// Schedule the next reconnect attempt if the budget allows
    fn schedule_reconnect(self: &Arc<Self>, session: &mut Session) -> bool {
        if !self.config.reconnect.allows(session.reconnect_attempts) {
            return false;
        }

        session.reconnect_attempts += 1;
        let attempt = session.reconnect_attempts;
        let delay = self.config.reconnect.delay_for_attempt(attempt);
        tracing::info!(
            channel_id = %session.channel_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling chat reconnect"
        );

        let inner = Arc::downgrade(self);
        let epoch = session.epoch;
        session.reconnect_task = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.reconnect(epoch).await;
            }
        }));
        self.set_state(ChatState::ReconnectPending);
        true
    }

    /// Close handler for links that ended without being asked to
    async fn on_link_dropped(
        self: &Arc<Self>,
        epoch: u64,
        channel_id: ChannelId,
        code: Option<u16>,
        reason: String,
    ) {
        let mut guard = self.session.lock().await;
        let current = guard.as_ref().is_some_and(|s| s.epoch == epoch);

        let mut exhausted = None;
        let reconnecting = match guard.as_mut() {
            Some(session) if current => {
                session.link = None;
                let scheduled = self.schedule_reconnect(session);
                if !scheduled {
                    exhausted = Some(session.reconnect_attempts);
                }
                scheduled
            }
            _ => false,
        };
        if exhausted.is_some() {
            *guard = None;
            self.set_state(ChatState::Idle);
        }
        drop(guard);

        tracing::info!(
            channel_id = %channel_id,
            code = ?code,
            reason = %reason,
            reconnecting,
            "chat transport closed"
        );
        if let Some(attempts) = exhausted {
            self.emit_error(
                Some(&channel_id),
                Error::ReconnectFailed {
                    attempts,
                    last_error: reason.clone(),
                },
                None,
            );
        }
        self.dispatcher.emit(Event::ChatDisconnected(DisconnectedEvent {
            channel_id,
            code,
            reason,
            // A stale link belongs to a session that was torn down on request
            requested: !current,
            reconnecting,
        }));
    }

    /// One scheduled reconnect attempt; failures only surface as events
    async fn reconnect(self: &Arc<Self>, epoch: u64) {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut().filter(|s| s.epoch == epoch) else {
            return;
        };
        session.reconnect_task = None;
        let channel_id = session.channel_id.clone();
        tracing::info!(
            channel_id = %channel_id,
            attempt = session.reconnect_attempts,
            "reconnecting chat"
        );

        let error = match self.open_link(&channel_id, epoch).await {
            Ok(link) => {
                session.link = Some(link);
                return;
            }
            Err(e) => e,
        };

        tracing::warn!(channel_id = %channel_id, error = %error, "chat reconnect attempt failed");
        let last_error = error.to_string();
        self.emit_error(Some(&channel_id), error, None);

        if self.schedule_reconnect(session) {
            return;
        }
        let attempts = session.reconnect_attempts;
        *guard = None;
        self.set_state(ChatState::Idle);
        drop(guard);

        self.emit_error(
            Some(&channel_id),
            Error::ReconnectFailed {
                attempts,
                last_error,
            },
            None,
        );
        self.dispatcher.emit(Event::ChatDisconnected(DisconnectedEvent {
            channel_id,
            code: None,
            reason: "reconnect attempts exhausted".to_string(),
            requested: false,
            reconnecting: false,
        }));
    }

    fn emit_error(&self, channel_id: Option<&ChannelId>, error: Error, raw: Option<String>) {
        emit_chat_error(&self.dispatcher, channel_id, &error, raw);
    }
}

fn emit_chat_error(
    dispatcher: &EventDispatcher,
    channel_id: Option<&ChannelId>,
    error: &Error,
    raw: Option<String>,
) {
    dispatcher.emit(Event::ChatError(ChatErrorEvent {
        channel_id: channel_id.cloned(),
        message: error.to_string(),
        raw,
    }));
}

/// Owns one transport until it closes; runs the heartbeat and dispatch
#[allow(clippy::too_many_arguments)]
async fn drive_link(
    inner: Weak<Inner>,
    dispatcher: EventDispatcher,
    epoch: u64,
    channel_id: ChannelId,
    heartbeat_interval: Duration,
    sink: Box<dyn FrameSink>,
    events: BoxStream<'static, TransportEvent>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
) {
    // The transport and command receiver are dropped when run_link returns,
    // before the session lock is taken below.
    let end = run_link(
        &dispatcher,
        &channel_id,
        heartbeat_interval,
        sink,
        events,
        commands,
    )
    .await;

    match end {
        LinkEnd::Requested { ack, code, reason } => {
            tracing::info!(channel_id = %channel_id, "chat disconnected");
            dispatcher.emit(Event::ChatDisconnected(DisconnectedEvent {
                channel_id,
                code,
                reason,
                requested: true,
                reconnecting: false,
            }));
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        }
        LinkEnd::Dropped { code, reason } => match inner.upgrade() {
            Some(inner) => inner.on_link_dropped(epoch, channel_id, code, reason).await,
            None => dispatcher.emit(Event::ChatDisconnected(DisconnectedEvent {
                channel_id,
                code,
                reason,
                requested: false,
                reconnecting: false,
            })),
        },
    }
}

async fn run_link(
    dispatcher: &EventDispatcher,
    channel_id: &ChannelId,
    heartbeat_interval: Duration,
    mut sink: Box<dyn FrameSink>,
    mut events: BoxStream<'static, TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
) -> LinkEnd {
    let mut heartbeat = time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(TransportEvent::Message(text)) => dispatch_frame(dispatcher, channel_id, text),
                Some(TransportEvent::Error(message)) => {
                    tracing::warn!(channel_id = %channel_id, error = %message, "chat transport error");
                    emit_chat_error(dispatcher, Some(channel_id), &Error::WebSocket(message), None);
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    return LinkEnd::Dropped { code, reason };
                }
                None => {
                    return LinkEnd::Dropped {
                        code: None,
                        reason: "transport stream ended".to_string(),
                    };
                }
            },
            command = commands.recv() => {
                let ack = match command {
                    Some(LinkCommand::Close(ack)) => Some(ack),
                    // Session dropped without a teardown
                    None => None,
                };
                if let Err(e) = sink.close().await {
                    tracing::debug!(channel_id = %channel_id, error = %e, "chat transport close failed");
                }
                let (code, reason) = await_closed(&mut events).await;
                return LinkEnd::Requested { ack, code, reason };
            }
            _ = heartbeat.tick() => send_ping(dispatcher, channel_id, sink.as_mut()).await,
        }
    }
}

async fn send_ping(dispatcher: &EventDispatcher, channel_id: &ChannelId, sink: &mut dyn FrameSink) {
    if !sink.is_open() {
        return;
    }
    let result = match OutboundFrame::Ping.to_text() {
        Ok(ping) => sink.send(ping).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(channel_id = %channel_id, error = %e, "heartbeat ping failed");
        emit_chat_error(dispatcher, Some(channel_id), &e, None);
    }
}

/// Drain inbound events until the transport confirms the close
async fn await_closed(events: &mut BoxStream<'static, TransportEvent>) -> (Option<u16>, String) {
    while let Some(event) = events.next().await {
        if let TransportEvent::Closed { code, reason } = event {
            return (code, reason);
        }
    }
    (None, "transport stream ended".to_string())
}

fn dispatch_frame(dispatcher: &EventDispatcher, channel_id: &ChannelId, text: String) {
    let received_at = Utc::now();
    match InboundFrame::parse(&text) {
        Ok(frame) => {
            if let Some(event) = frame.into_event(channel_id, received_at) {
                dispatcher.emit(event);
            }
        }
        Err(e) => {
            tracing::debug!(
                channel_id = %channel_id,
                error = %e,
                "unparseable chat frame (first 200 chars): {}",
                text.chars().take(200).collect::<String>()
            );
            let error = Error::Protocol(format!("malformed frame: {}", e));
            emit_chat_error(dispatcher, Some(channel_id), &error, Some(text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventName;
    use crate::websocket::mock::{CountingTokens, MockConnector};
    use std::sync::Mutex as StdMutex;

    struct Harness {
        session: ChatSession,
        connector: MockConnector,
        tokens: Arc<CountingTokens>,
        events: Arc<StdMutex<Vec<Event>>>,
    }

    impl Harness {
        fn new() -> Self {
            let dispatcher = EventDispatcher::new();
            let events = Arc::new(StdMutex::new(Vec::new()));
            for name in EventName::ALL {
                let events = Arc::clone(&events);
                dispatcher
                    .on(name, move |e| events.lock().unwrap().push(e.clone()))
                    .unwrap();
            }

            let connector = MockConnector::default();
            let tokens = Arc::new(CountingTokens::default());
            let session = ChatSession::new(
                SessionConfig::new("ws://chat.test/ws"),
                tokens.clone(),
                Arc::new(connector.clone()),
                dispatcher,
            );
            Self {
                session,
                connector,
                tokens,
                events,
            }
        }

        fn events_named(&self, name: EventName) -> Vec<Event> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.name() == name)
                .cloned()
                .collect()
        }

        fn disconnects(&self) -> Vec<DisconnectedEvent> {
            self.events_named(EventName::ChatDisconnected)
                .into_iter()
                .filter_map(|e| match e {
                    Event::ChatDisconnected(d) => Some(d),
                    _ => None,
                })
                .collect()
        }
    }

    /// Let spawned tasks run without moving the paused clock far
    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    fn pings(sent: &[String]) -> usize {
        sent.iter().filter(|f| f.as_str() == r#"{"type":"PING"}"#).count()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_authenticates_and_announces_once() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        let connected = h.events_named(EventName::ChatConnected);
        assert_eq!(connected.len(), 1);
        match &connected[0] {
            Event::ChatConnected(e) => assert_eq!(e.channel_id.as_str(), "c1"),
            other => panic!("unexpected event {:?}", other),
        }

        let sent = h.connector.link(0).sent();
        let auth: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(
            auth,
            serde_json::json!({"type": "AUTH", "token": "chat-token-1", "channelId": "c1"})
        );
        assert_eq!(h.session.state(), ChatState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_sends_one_ping_per_interval() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        time::sleep(Duration::from_secs(29)).await;
        assert_eq!(pings(&h.connector.link(0).sent()), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(pings(&h.connector.link(0).sent()), 1);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(pings(&h.connector.link(0).sent()), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_skips_closed_transport() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();
        h.connector.link(0).set_open(false);

        time::sleep(Duration::from_secs(95)).await;
        assert_eq!(pings(&h.connector.link(0).sent()), 0);
        assert!(h.events_named(EventName::ChatError).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_id_is_rejected() {
        let h = Harness::new();
        let result = h.session.connect("").await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(h.connector.attempts().is_empty());
        assert_eq!(h.tokens.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_failure_does_not_reconnect() {
        let h = Harness::new();
        h.connector.script([true]);

        let result = h.session.connect("c1").await;
        assert!(matches!(result, Err(Error::WebSocket(_))));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.connector.attempts().len(), 1);
        assert_eq!(h.session.state(), ChatState::Idle);
        assert!(h.events_named(EventName::ChatConnected).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn token_failure_fails_connect() {
        let h = Harness::new();
        h.tokens.set_failing(true);

        let result = h.session.connect("c1").await;
        assert!(matches!(result, Err(Error::Authorization(_))));
        assert!(h.connector.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closures_back_off_exponentially_then_stop() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        let mut closed_at = Vec::new();
        for i in 0..6 {
            closed_at.push(Instant::now());
            h.connector.link(i).close_remote(1006);
            time::sleep(Duration::from_secs(60)).await;
        }
        time::sleep(Duration::from_secs(600)).await;

        let attempts = h.connector.attempts();
        // Initial connect plus five reconnects
        assert_eq!(attempts.len(), 6);
        for (i, expected) in [2u64, 4, 8, 16, 32].into_iter().enumerate() {
            let waited = attempts[i + 1] - closed_at[i];
            assert!(
                waited >= Duration::from_secs(expected)
                    && waited < Duration::from_secs(expected) + Duration::from_millis(50),
                "attempt {} waited {:?}",
                i + 1,
                waited
            );
        }

        let disconnects = h.disconnects();
        assert_eq!(disconnects.len(), 6);
        assert!(disconnects[..5].iter().all(|d| d.reconnecting && !d.requested));
        assert!(disconnects[5].is_terminal());
        assert_eq!(disconnects[5].code, Some(1006));

        let errors = h.events_named(EventName::ChatError);
        assert!(errors.iter().any(|e| matches!(
            e,
            Event::ChatError(err) if err.message.contains("Reconnection failed after 5 attempts")
        )));
        assert_eq!(h.session.state(), ChatState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnect_attempts_consume_budget() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();
        h.connector.refuse_all(true);

        h.connector.link(0).close_remote(1006);
        time::sleep(Duration::from_secs(600)).await;

        let attempts = h.connector.attempts();
        assert_eq!(attempts.len(), 6);
        for (i, expected) in [4u64, 8, 16, 32].into_iter().enumerate() {
            let waited = attempts[i + 2] - attempts[i + 1];
            assert!(
                waited >= Duration::from_secs(expected)
                    && waited < Duration::from_secs(expected) + Duration::from_millis(50),
                "attempt {} waited {:?}",
                i + 2,
                waited
            );
        }

        let disconnects = h.disconnects();
        assert_eq!(disconnects.len(), 2);
        assert!(disconnects[0].reconnecting);
        assert!(disconnects[1].is_terminal());
        assert_eq!(disconnects[1].reason, "reconnect attempts exhausted");
        assert_eq!(h.session.state(), ChatState::Idle);
        // A fresh token was requested for every attempt
        assert_eq!(h.tokens.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        h.connector.link(0).close_remote(1006);
        settle().await;
        assert_eq!(h.session.state(), ChatState::ReconnectPending);

        h.session.disconnect().await.unwrap();
        time::sleep(Duration::from_secs(600)).await;

        assert_eq!(h.connector.attempts().len(), 1);
        assert_eq!(h.session.state(), ChatState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_close_racing_disconnect_is_announced_once() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        // No settle: the driver sees the remote close and the close command together
        h.connector.link(0).close_remote(1006);
        h.session.disconnect().await.unwrap();
        time::sleep(Duration::from_secs(600)).await;

        let disconnects = h.disconnects();
        assert_eq!(disconnects.len(), 1);
        assert!(disconnects[0].requested);
        assert!(!disconnects[0].reconnecting);
        assert_eq!(h.connector.attempts().len(), 1);
        assert_eq!(h.session.state(), ChatState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_uses_fresh_token() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        h.connector.link(0).close_remote(1006);
        time::sleep(Duration::from_secs(3)).await;

        assert_eq!(h.connector.link_count(), 2);
        let auth: serde_json::Value =
            serde_json::from_str(&h.connector.link(1).sent()[0]).unwrap();
        assert_eq!(auth["token"], "chat-token-2");
        assert_eq!(h.session.state(), ChatState::Connected);
        assert_eq!(h.events_named(EventName::ChatConnected).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent_and_announced_once() {
        let h = Harness::new();
        h.session.disconnect().await.unwrap();
        assert!(h.disconnects().is_empty());

        h.session.connect("c1").await.unwrap();
        h.session.disconnect().await.unwrap();
        h.session.disconnect().await.unwrap();

        let disconnects = h.disconnects();
        assert_eq!(disconnects.len(), 1);
        assert!(disconnects[0].requested);
        assert!(disconnects[0].is_terminal());
        assert_eq!(disconnects[0].code, Some(1000));
        assert!(!h.connector.link(0).is_open());
        assert!(h.events_named(EventName::ChatError).is_empty());

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.connector.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_connect_replaces_first() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();
        h.session.connect("c2").await.unwrap();

        assert!(!h.connector.link(0).is_open());
        assert!(h.connector.link(1).is_open());

        let names: Vec<EventName> = h.events.lock().unwrap().iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec![
                EventName::ChatConnected,
                EventName::ChatDisconnected,
                EventName::ChatConnected
            ]
        );
        let disconnects = h.disconnects();
        assert_eq!(disconnects[0].channel_id.as_str(), "c1");
        assert!(disconnects[0].requested);

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.connector.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_frame_is_dispatched_with_defaults() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        h.connector
            .link(0)
            .push_text(r#"{"type":"CHAT","userId":"u1","nickname":"n","content":"hi"}"#);
        settle().await;

        let messages = h.events_named(EventName::ChatMessage);
        assert_eq!(messages.len(), 1);
        let Event::ChatMessage(msg) = &messages[0] else {
            panic!("expected chat message");
        };
        assert_eq!(msg.message, "hi");
        assert!(msg.badges.is_empty());
        assert_eq!(msg.channel_id.as_str(), "c1");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_frame_is_ignored() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();
        let before = h.events.lock().unwrap().len();

        h.connector
            .link(0)
            .push_text(r#"{"type":"WHISPER","userId":"u1","content":"psst"}"#);
        h.connector.link(0).push_text(r#"{"type":"PONG"}"#);
        settle().await;

        assert_eq!(h.events.lock().unwrap().len(), before);
        assert_eq!(h.session.state(), ChatState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_reports_error_and_keeps_connection() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        h.connector.link(0).push_text("{not json");
        settle().await;

        let errors = h.events_named(EventName::ChatError);
        assert_eq!(errors.len(), 1);
        let Event::ChatError(err) = &errors[0] else {
            panic!("expected chat error");
        };
        assert_eq!(err.raw.as_deref(), Some("{not json"));
        assert!(h.connector.link(0).is_open());
        assert_eq!(h.session.state(), ChatState::Connected);
        assert!(h.disconnects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_does_not_reconnect_by_itself() {
        let h = Harness::new();
        h.session.connect("c1").await.unwrap();

        h.connector
            .link(0)
            .push(TransportEvent::Error("tls hiccup".to_string()));
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.events_named(EventName::ChatError).len(), 1);
        assert_eq!(h.connector.attempts().len(), 1);
        assert_eq!(h.session.state(), ChatState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_subscriber_does_not_break_session() {
        let h = Harness::new();
        h.session
            .dispatcher()
            .on(EventName::ChatMessage, |_| panic!("subscriber bug"))
            .unwrap();
        h.session.connect("c1").await.unwrap();

        let link = h.connector.link(0);
        link.push_text(r#"{"type":"CHAT","userId":"u1","nickname":"n","content":"one"}"#);
        link.push_text(r#"{"type":"CHAT","userId":"u1","nickname":"n","content":"two"}"#);
        settle().await;

        assert_eq!(h.events_named(EventName::ChatMessage).len(), 2);
        assert_eq!(h.session.state(), ChatState::Connected);
    }
}
