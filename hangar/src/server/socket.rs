//! WebSocket push endpoint
//!
//! Each socket owns one event bus connection. Clients join and leave topics
//! with JSON frames and receive every event published on their rooms.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use openapi_server::models::{SocketClientMessage, SocketServerMessage};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::HangarError;
use crate::events::BusConnection;
use crate::server::state::ServerState;

/// WebSocket upgrade handler
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let session_id = Uuid::new_v4();
    info!("Socket session {} connected", session_id);

    let mut connection = state.bus.connect();
    let (mut sender, mut receiver) = socket.split();

    if send_frame(&mut sender, &SocketServerMessage::Connected { session_id })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = connection.recv() => {
                let Some(event) = event else { break };
                if send_frame(&mut sender, &SocketServerMessage::Event(event)).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let reply = match serde_json::from_str::<SocketClientMessage>(&text) {
                        Ok(message) => handle_client_message(&connection, message),
                        Err(e) => SocketServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    };
                    if send_frame(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Socket session {} errored: {}", session_id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    // Dropping the connection leaves every room
    drop(connection);
    info!("Socket session {} disconnected", session_id);
}

fn handle_client_message(
    connection: &BusConnection,
    message: SocketClientMessage,
) -> SocketServerMessage {
    match message {
        SocketClientMessage::Join { topic } => {
            connection.join(topic.clone());
            debug!("Connection {} joined {}", connection.id(), topic);
            SocketServerMessage::Joined { topic }
        }
        SocketClientMessage::Leave { topic } => {
            connection.leave(&topic);
            debug!("Connection {} left {}", connection.id(), topic);
            SocketServerMessage::Left { topic }
        }
        SocketClientMessage::Ping => SocketServerMessage::Pong,
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &SocketServerMessage,
) -> Result<(), HangarError> {
    let json = serde_json::to_string(frame)?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| HangarError::SocketError(e.to_string()))
}
