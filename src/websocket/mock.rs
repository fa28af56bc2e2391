//! Scripted transports and token sources for session tests.

use futures_util::future::BoxFuture;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::token::ChatTokenSource;
use super::transport::{Connection, Connector, FrameSink, TransportEvent};
use crate::error::{Error, Result};
use crate::types::ChannelId;

/// Hands out `chat-token-N`, counting calls
#[derive(Default)]
pub(crate) struct CountingTokens {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingTokens {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ChatTokenSource for CountingTokens {
    fn chat_access_token<'a>(&'a self, _channel_id: &'a ChannelId) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Authorization("token refresh rejected".to_string()));
            }
            Ok(format!("chat-token-{}", n))
        })
    }
}

/// Server side of one mock transport
#[derive(Clone)]
pub(crate) struct MockLink {
    sent: Arc<Mutex<Vec<String>>>,
    open: Arc<AtomicBool>,
    server: mpsc::UnboundedSender<TransportEvent>,
}

impl MockLink {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Flip the open flag without delivering a close
    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub(crate) fn push(&self, event: TransportEvent) {
        let _ = self.server.send(event);
    }

    pub(crate) fn push_text(&self, text: &str) {
        self.push(TransportEvent::Message(text.to_string()));
    }

    /// Close from the server side
    pub(crate) fn close_remote(&self, code: u16) {
        self.set_open(false);
        self.push(TransportEvent::Closed {
            code: Some(code),
            reason: "server went away".to_string(),
        });
    }
}

struct MockSink {
    link: MockLink,
}

impl FrameSink for MockSink {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.link.is_open() {
                return Err(Error::ConnectionClosed);
            }
            self.link.sent.lock().unwrap().push(text);
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.link.is_open() {
                self.link.set_open(false);
                self.link.push(TransportEvent::Closed {
                    code: Some(1000),
                    reason: "normal closure".to_string(),
                });
            }
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.link.is_open()
    }
}

#[derive(Default)]
struct MockState {
    attempts: Vec<Instant>,
    refusals: VecDeque<bool>,
    refuse_all: bool,
    links: Vec<MockLink>,
}

/// Connector whose transports are driven from the test
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Script the outcome of the next attempts (`true` = refuse)
    pub(crate) fn script(&self, refusals: impl IntoIterator<Item = bool>) {
        self.state.lock().unwrap().refusals.extend(refusals);
    }

    pub(crate) fn refuse_all(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_all = refuse;
    }

    /// Instants at which `connect` was called
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub(crate) fn link(&self, index: usize) -> MockLink {
        self.state.lock().unwrap().links[index].clone()
    }

    pub(crate) fn link_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<Connection>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut state = state.lock().unwrap();
            state.attempts.push(Instant::now());
            let refused = state.refusals.pop_front().unwrap_or(state.refuse_all);
            if refused {
                return Err(Error::WebSocket("connection refused".to_string()));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let link = MockLink {
                sent: Arc::new(Mutex::new(Vec::new())),
                open: Arc::new(AtomicBool::new(true)),
                server: tx,
            };
            state.links.push(link.clone());

            let events = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            });
            Ok(Connection {
                sink: Box::new(MockSink { link }),
                events: Box::pin(events),
            })
        })
    }
}
