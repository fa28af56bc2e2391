use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::Result;

/// Notification from an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame
    Message(String),
    /// A transport-level error; the transport is expected to close afterwards
    Error(String),
    /// The transport closed
    Closed { code: Option<u16>, reason: String },
}

/// Write half of an open transport
pub trait FrameSink: Send {
    /// Send one text frame
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<()>>;

    /// Start a graceful close; the event stream reports completion with
    /// [`TransportEvent::Closed`]
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Whether frames can currently be sent
    fn is_open(&self) -> bool;
}

/// An open transport, split into its write half and its inbound events
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub events: BoxStream<'static, TransportEvent>,
}

/// Opens transports to a chat socket URL
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = connect_async(url.as_str()).await?;
            let (write, read) = ws_stream.split();

            let open = Arc::new(AtomicBool::new(true));
            let sink = TungsteniteSink {
                inner: write,
                open: Arc::clone(&open),
            };

            let read_open = Arc::clone(&open);
            let events = read
                .filter_map(move |msg| {
                    let open = Arc::clone(&read_open);
                    async move {
                        match msg {
                            Ok(Message::Text(text)) => Some(TransportEvent::Message(text)),
                            Ok(Message::Close(frame)) => {
                                open.store(false, Ordering::SeqCst);
                                let (code, reason) = match frame {
                                    Some(frame) => {
                                        (Some(u16::from(frame.code)), frame.reason.into_owned())
                                    }
                                    None => (None, String::new()),
                                };
                                Some(TransportEvent::Closed { code, reason })
                            }
                            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                                // Ignore ping/pong frames (handled automatically)
                                None
                            }
                            Ok(Message::Binary(_)) => Some(TransportEvent::Error(
                                "Unexpected binary message".to_string(),
                            )),
                            Ok(Message::Frame(_)) => None,
                            Err(e) => {
                                open.store(false, Ordering::SeqCst);
                                Some(TransportEvent::Error(e.to_string()))
                            }
                        }
                    }
                })
                .chain(stream::once(async move {
                    open.store(false, Ordering::SeqCst);
                    TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    }
                }))
                .boxed();

            Ok(Connection {
                sink: Box::new(sink),
                events,
            })
        })
    }
}

struct TungsteniteSink {
    inner: futures_util::stream::SplitSink<WsStream, Message>,
    open: Arc<AtomicBool>,
}

impl FrameSink for TungsteniteSink {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Err(e) = self.inner.send(Message::Text(text)).await {
                self.open.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.open.store(false, Ordering::SeqCst);
            self.inner.close().await?;
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
