use actix::Message;
use serde::{Deserialize, Serialize};

use crate::game::review::ReviewFrame;
use crate::models::game_state::GameSnapshot;
use crate::models::records::SavedGameSummary;

/// Message sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClientMessage {
    pub action: String,
    pub square: Option<String>,
    pub move_from: Option<String>,
    pub move_to: Option<String>,
    pub promote_to: Option<String>,
    pub mode: Option<String>,
    pub bot_side: Option<String>,
    pub skill_level: Option<u8>,
    pub start_time_minutes: Option<u32>,
    pub increment_seconds: Option<u32>,
    pub enabled: Option<bool>,
    pub game_id: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub annotated: Option<bool>,
    pub ply: Option<usize>,
}

/// Message sent from server to client
#[derive(Serialize, Debug, Clone, Default)]
pub struct ServerMessage {
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<GameSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_games: Option<Vec<SavedGameSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moves_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewFrame>,
}

impl ServerMessage {
    pub fn new(message_type: &str) -> Self {
        Self {
            message_type: message_type.to_string(),
            ..Default::default()
        }
    }

    pub fn snapshot(snapshot: GameSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::new("state")
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new("error")
        }
    }
}

/// Last move information
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LastMove {
    pub from: String,
    pub to: String,
}

/// Message type for WebSocket communication
#[derive(Message)]
#[rtype(result = "()")]
pub struct ChessWebSocketMessage(pub String);
