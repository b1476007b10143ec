//! Push transports
//!
//! A push connection delivers the events of the topics it has joined until it
//! is lost. Two transports exist: the in-process event bus and the server's
//! WebSocket endpoint.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use openapi_server::models::{SocketClientMessage, SocketServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::HangarError;
use crate::events::{BusConnection, Event, EventBus, Topic};

/// Live push channel
#[async_trait]
pub trait PushConnection: Send {
    async fn join(&mut self, topic: Topic) -> Result<(), HangarError>;

    async fn leave(&mut self, topic: Topic) -> Result<(), HangarError>;

    /// Next event on a joined topic; `None` once the connection is lost
    async fn next_event(&mut self) -> Option<Event>;

    /// Round trip to the far end; connections without one are always live
    async fn ping(&mut self) -> Result<(), HangarError> {
        Ok(())
    }
}

/// Opens push connections
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, HangarError>;
}

// ================================= EVENT BUS ==================================== //

/// Push over the in-process event bus
pub struct BusTransport {
    bus: Arc<EventBus>,
}

impl BusTransport {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

struct BusPush {
    connection: BusConnection,
}

#[async_trait]
impl PushTransport for BusTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, HangarError> {
        Ok(Box::new(BusPush {
            connection: self.bus.connect(),
        }))
    }
}

#[async_trait]
impl PushConnection for BusPush {
    async fn join(&mut self, topic: Topic) -> Result<(), HangarError> {
        self.connection.join(topic);
        Ok(())
    }

    async fn leave(&mut self, topic: Topic) -> Result<(), HangarError> {
        self.connection.leave(&topic);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Event> {
        self.connection.recv().await
    }
}

// ================================= WEBSOCKET ==================================== //

/// Push over a remote server's `/ws` endpoint
pub struct SocketTransport {
    url: Url,
}

impl SocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Socket endpoint of the server at `base_url`
    pub fn from_base_url(base_url: &str) -> Result<Self, HangarError> {
        Ok(Self::new(build_socket_url(base_url)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

struct SocketPush {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,

    /// Events that arrived while waiting for an acknowledgement
    pending: VecDeque<Event>,
}

#[async_trait]
impl PushTransport for SocketTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, HangarError> {
        debug!("Connecting to {}", self.url);
        let (mut stream, _) = connect_async(self.url.as_str()).await?;

        // The server greets every session before anything else
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text)? {
                SocketServerMessage::Connected { session_id } => {
                    info!("Push session {} established", session_id);
                }
                other => {
                    return Err(HangarError::SocketError(format!(
                        "unexpected greeting: {:?}",
                        other
                    )))
                }
            },
            Some(Err(e)) => return Err(e.into()),
            _ => {
                return Err(HangarError::SocketError(
                    "connection closed during handshake".to_string(),
                ))
            }
        }

        Ok(Box::new(SocketPush {
            stream,
            pending: VecDeque::new(),
        }))
    }
}

impl SocketPush {
    async fn send(&mut self, message: &SocketClientMessage) -> Result<(), HangarError> {
        let json = serde_json::to_string(message)?;
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Next server frame; `None` once the connection is lost
    async fn next_frame(&mut self) -> Option<SocketServerMessage> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(frame) => return Some(frame),
                    Err(e) => warn!("Unreadable push frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Push connection closed");
                    return None;
                }
                Some(Err(e)) => {
                    warn!("Push connection error: {}", e);
                    return None;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// Read frames until `is_ack` matches, queueing any events on the way
    async fn await_ack(
        &mut self,
        is_ack: impl Fn(&SocketServerMessage) -> bool,
    ) -> Result<(), HangarError> {
        loop {
            match self.next_frame().await {
                Some(frame) if is_ack(&frame) => return Ok(()),
                Some(SocketServerMessage::Event(event)) => self.pending.push_back(event),
                Some(SocketServerMessage::Error { message }) => {
                    return Err(HangarError::SocketError(message))
                }
                Some(other) => debug!("Push frame: {:?}", other),
                None => {
                    return Err(HangarError::SocketError(
                        "connection closed while waiting for acknowledgement".to_string(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl PushConnection for SocketPush {
    async fn join(&mut self, topic: Topic) -> Result<(), HangarError> {
        self.send(&SocketClientMessage::Join {
            topic: topic.clone(),
        })
        .await?;
        self.await_ack(|frame| matches!(frame, SocketServerMessage::Joined { topic: t } if *t == topic))
            .await
    }

    async fn leave(&mut self, topic: Topic) -> Result<(), HangarError> {
        self.send(&SocketClientMessage::Leave {
            topic: topic.clone(),
        })
        .await?;
        self.await_ack(|frame| matches!(frame, SocketServerMessage::Left { topic: t } if *t == topic))
            .await
    }

    async fn ping(&mut self) -> Result<(), HangarError> {
        self.send(&SocketClientMessage::Ping).await?;
        self.await_ack(|frame| matches!(frame, SocketServerMessage::Pong))
            .await
    }

    async fn next_event(&mut self) -> Option<Event> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        loop {
            match self.next_frame().await? {
                SocketServerMessage::Event(event) => return Some(event),
                SocketServerMessage::Error { message } => {
                    warn!("Push server reported: {}", message);
                }
                other => debug!("Push frame: {:?}", other),
            }
        }
    }
}

/// `http(s)://host/base` becomes `ws(s)://host/base/ws`
pub fn build_socket_url(base_url: &str) -> Result<Url, HangarError> {
    let mut url = Url::parse(base_url).map_err(|e| HangarError::ConfigError(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HangarError::ConfigError(format!(
                "Invalid server URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| HangarError::ConfigError("Failed to set scheme".to_string()))?;

    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);

    Ok(url)
}
