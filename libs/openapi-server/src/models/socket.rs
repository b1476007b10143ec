//! WebSocket push channel frames

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::{Event, Topic};

/// Frame sent by a socket client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SocketClientMessage {
    Join { topic: Topic },
    Leave { topic: Topic },
    Ping,
}

/// Frame sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SocketServerMessage {
    Connected { session_id: Uuid },
    Joined { topic: Topic },
    Left { topic: Topic },
    Event(Event),
    Pong,
    Error { message: String },
}
