//! Typed publish/subscribe registry for chat and token-lifecycle events.
//!
//! The set of event names is closed ([`EventName`]). Handlers are plain
//! synchronous closures; they run on whatever task calls [`EventDispatcher::emit`],
//! in registration order. A panicking handler is logged and skipped.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::{Error, Result};
use crate::types::{
    ChatErrorEvent, ChatMessageEvent, ConnectedEvent, DisconnectedEvent, DonationEvent,
    NoticeEvent, SubscriptionEvent, TokenExpiredEvent, TokenRefreshEvent,
};

/// Every event name a handler can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    TokenRefresh,
    TokenExpired,
    ChatMessage,
    ChatDonation,
    ChatSubscription,
    ChatNotice,
    ChatError,
    ChatConnected,
    ChatDisconnected,
}

impl EventName {
    pub const ALL: [EventName; 9] = [
        EventName::TokenRefresh,
        EventName::TokenExpired,
        EventName::ChatMessage,
        EventName::ChatDonation,
        EventName::ChatSubscription,
        EventName::ChatNotice,
        EventName::ChatError,
        EventName::ChatConnected,
        EventName::ChatDisconnected,
    ];

    /// Wire name of the event (e.g. `"chatMessage"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::TokenRefresh => "tokenRefresh",
            EventName::TokenExpired => "tokenExpired",
            EventName::ChatMessage => "chatMessage",
            EventName::ChatDonation => "chatDonation",
            EventName::ChatSubscription => "chatSubscription",
            EventName::ChatNotice => "chatNotice",
            EventName::ChatError => "chatError",
            EventName::ChatConnected => "chatConnected",
            EventName::ChatDisconnected => "chatDisconnected",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown event name: {}", s)))
    }
}

/// Anything that names an event: an [`EventName`] or its string form
pub trait IntoEventName {
    fn into_event_name(self) -> Result<EventName>;
}

impl IntoEventName for EventName {
    fn into_event_name(self) -> Result<EventName> {
        Ok(self)
    }
}

impl IntoEventName for &str {
    fn into_event_name(self) -> Result<EventName> {
        self.parse()
    }
}

impl IntoEventName for String {
    fn into_event_name(self) -> Result<EventName> {
        self.parse()
    }
}

/// An event delivered to subscribers
#[derive(Debug, Clone)]
pub enum Event {
    TokenRefresh(TokenRefreshEvent),
    TokenExpired(TokenExpiredEvent),
    ChatMessage(ChatMessageEvent),
    ChatDonation(DonationEvent),
    ChatSubscription(SubscriptionEvent),
    ChatNotice(NoticeEvent),
    ChatError(ChatErrorEvent),
    ChatConnected(ConnectedEvent),
    ChatDisconnected(DisconnectedEvent),
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::TokenRefresh(_) => EventName::TokenRefresh,
            Event::TokenExpired(_) => EventName::TokenExpired,
            Event::ChatMessage(_) => EventName::ChatMessage,
            Event::ChatDonation(_) => EventName::ChatDonation,
            Event::ChatSubscription(_) => EventName::ChatSubscription,
            Event::ChatNotice(_) => EventName::ChatNotice,
            Event::ChatError(_) => EventName::ChatError,
            Event::ChatConnected(_) => EventName::ChatConnected,
            Event::ChatDisconnected(_) => EventName::ChatDisconnected,
        }
    }
}

/// Identifies one registration within a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    handlers: Mutex<HashMap<EventName, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<EventName, Vec<Entry>>> {
        // Handlers never run under this lock, so poisoning carries no torn state.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, name: EventName, id: SubscriptionId, handler: Handler) {
        self.lock().entry(name).or_default().push(Entry { id, handler });
    }

    fn remove(&self, name: EventName, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let Some(entries) = handlers.get_mut(&name) else {
            return false;
        };
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }
}

/// De-registration capability returned by [`EventDispatcher::on`] and
/// [`EventDispatcher::once`]
///
/// Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct SubscriptionHandle {
    name: EventName,
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_name(&self) -> EventName {
        self.name
    }

    /// Remove the handler; returns whether it was still registered
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.name, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

/// Publish/subscribe registry keyed by [`EventName`]
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `name` is not a recognized event name.
    pub fn on<N, F>(&self, name: N, handler: F) -> Result<SubscriptionHandle>
    where
        N: IntoEventName,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let name = name.into_event_name()?;
        let id = self.registry.next_id();
        self.registry.insert(name, id, Arc::new(handler));
        Ok(self.handle(name, id))
    }

    /// Register `handler` for a single invocation
    pub fn once<N, F>(&self, name: N, handler: F) -> Result<SubscriptionHandle>
    where
        N: IntoEventName,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let name = name.into_event_name()?;
        let id = self.registry.next_id();
        let registry = Arc::downgrade(&self.registry);
        let fired = AtomicBool::new(false);

        let wrapper = move |event: &Event| {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(registry) = registry.upgrade() {
                registry.remove(name, id);
            }
            handler(event);
        };

        self.registry.insert(name, id, Arc::new(wrapper));
        Ok(self.handle(name, id))
    }

    /// Remove the handler registered under `id`; a no-op if it is gone
    pub fn off<N: IntoEventName>(&self, name: N, id: SubscriptionId) -> Result<()> {
        let name = name.into_event_name()?;
        self.registry.remove(name, id);
        Ok(())
    }

    /// Number of handlers currently registered for `name`
    pub fn listener_count(&self, name: EventName) -> usize {
        self.registry.lock().get(&name).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler registered for its name at call time
    pub fn emit(&self, event: Event) {
        let name = event.name();
        let handlers: Vec<Handler> = match self.registry.lock().get(&name) {
            Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(event = %name, "event handler panicked");
            }
        }
    }

    fn handle(&self, name: EventName, id: SubscriptionId) -> SubscriptionHandle {
        SubscriptionHandle {
            name,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventName, usize> = self
            .registry
            .lock()
            .iter()
            .map(|(name, entries)| (*name, entries.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}
