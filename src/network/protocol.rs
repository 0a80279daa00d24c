//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is one JSON object with a `type` discriminator.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::game::chat::ChatEntry;
use crate::game::state::{Bomb, Direction, Explosion, GameMap, GridPos, Player, PlayerId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// `id` is the durable session id handed out in `playerJoined`. It is kept
/// as raw text here; the session resolves it and answers `reset` when it
/// names nobody.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join the lobby. A known `id` gets `playerExists` instead.
    Join {
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },

    /// Ask for the lobby view.
    Lobby {
        #[serde(default)]
        id: Option<String>,
    },

    /// Post a chat line.
    Chat {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        message: String,
    },

    /// Acknowledge the start barrier.
    GameStart {
        #[serde(default)]
        id: Option<String>,
    },

    /// Move one tile.
    Move {
        #[serde(default)]
        id: Option<String>,
        direction: Direction,
    },

    /// Drop a bomb on the current tile.
    PlaceBomb {
        #[serde(default)]
        id: Option<String>,
    },

    /// Leave the round for good.
    LeaveGame {
        #[serde(default)]
        id: Option<String>,
    },

    /// The client reopened its connection after a page load.
    PageReload {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        page: Option<String>,
    },
}

impl ClientMessage {
    /// Wire names of every client message.
    pub const KINDS: [&'static str; 8] = [
        "join", "lobby", "chat", "gameStart", "move", "placeBomb", "leaveGame", "pageReload",
    ];

    /// Parse one inbound frame, telling malformed and unknown messages apart.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !Self::KINDS.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Raw session id carried by the message.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Join { id, .. }
            | ClientMessage::Lobby { id }
            | ClientMessage::Chat { id, .. }
            | ClientMessage::GameStart { id }
            | ClientMessage::Move { id, .. }
            | ClientMessage::PlaceBomb { id }
            | ClientMessage::LeaveGame { id }
            | ClientMessage::PageReload { id, .. } => id.as_deref(),
        }
    }

    /// Wire name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Lobby { .. } => "lobby",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::GameStart { .. } => "gameStart",
            ClientMessage::Move { .. } => "move",
            ClientMessage::PlaceBomb { .. } => "placeBomb",
            ClientMessage::LeaveGame { .. } => "leaveGame",
            ClientMessage::PageReload { .. } => "pageReload",
        }
    }
}

/// Inbound parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not JSON, or fields of the wrong shape.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// No `type` field.
    #[error("message has no type")]
    MissingType,
    /// `type` names no known message.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

impl ProtocolError {
    /// Text sent back to the client.
    pub fn client_message(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) | ProtocolError::MissingType => "Invalid message",
            ProtocolError::UnknownType(_) => "Unknown message type",
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Join accepted.
    PlayerJoined {
        id: PlayerId,
        nickname: String,
    },

    /// Join carried an id that is already registered.
    PlayerExists {
        id: PlayerId,
        nickname: String,
    },

    /// Request refused.
    Error(ServerError),

    /// Lobby membership and chat.
    LobbyUpdate(LobbyUpdate),

    /// Seconds left before the countdown.
    WaitingTimer {
        #[serde(rename = "timeLeft")]
        time_left: u32,
    },

    /// Seconds left before the round; `null` when cancelled.
    ReadyTimer {
        countdown: Option<u32>,
    },

    /// Start barrier: open the game view and answer `gameStart`.
    #[serde(rename = "gameState")]
    StartBarrier,

    /// Full round snapshot.
    GameStarted(GameSnapshot),

    /// A player moved.
    PlayerMoved {
        id: PlayerId,
        position: GridPos,
        #[serde(rename = "oldPosition")]
        old_position: GridPos,
    },

    /// A bomb was placed.
    BombPlaced {
        bomb: Bomb,
    },

    /// A bomb went off.
    Explosion(ExplosionReport),

    /// A player's stats changed.
    PlayerUpdate {
        player: Player,
    },

    /// A player is out.
    PlayerEliminated {
        id: PlayerId,
        nickname: String,
    },

    /// A power-up was taken off the map.
    PowerUpPickup {
        #[serde(rename = "powerUpId")]
        power_up_id: Uuid,
    },

    /// Round over. `winner` is `null` on a draw.
    GameEnded {
        winner: Option<String>,
    },

    /// Chat line.
    Chat(ChatEntry),

    /// Session forgotten; the client must start over.
    Reset,

    /// The client belongs in the game view.
    ForceGameRedirect,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    /// Human-readable message.
    pub message: String,
    /// Set when the lobby is full.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub game_full: bool,
}

impl ServerError {
    /// Plain error.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), game_full: false }
    }
}

/// Lobby view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyUpdate {
    /// Registered sessions.
    pub count: usize,
    /// Their nicknames, in join order.
    pub players: Vec<String>,
    /// Lobby at capacity.
    pub game_full: bool,
    /// Chat so far.
    pub chat_history: Vec<ChatEntry>,
}

/// Round snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Current map.
    pub map: GameMap,
    /// Players by slot.
    pub players: Vec<Player>,
    /// Chat so far.
    pub chat_history: Vec<ChatEntry>,
}

/// Detonation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplosionReport {
    /// Bomb that went off.
    pub bomb_id: Uuid,
    /// Resulting explosion.
    pub explosion: Explosion,
    /// Map after walls were cleared and power-ups dropped.
    pub updated_map: GameMap,
    /// Players hit, after damage.
    pub players: Vec<Player>,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let msg = ClientMessage::parse(r#"{"type":"join","nickname":"ann"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Join { nickname: Some("ann".into()), id: None });
        assert_eq!(msg.session_id(), None);
    }

    #[test]
    fn test_parse_move() {
        let msg = ClientMessage::parse(r#"{"type":"move","id":"abc","direction":"left"}"#).unwrap();
        assert_eq!(msg.session_id(), Some("abc"));
        assert_eq!(msg.kind(), "move");
        assert!(matches!(msg, ClientMessage::Move { direction: Direction::Left, .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(ClientMessage::parse("{nope"), Err(ProtocolError::Malformed(_))));
        assert_eq!(ClientMessage::parse(r#"{"id":"x"}"#), Err(ProtocolError::MissingType));
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#),
            Err(ProtocolError::UnknownType("dance".into()))
        );
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"move","id":"x","direction":"sideways"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_client_text() {
        assert_eq!(ProtocolError::MissingType.client_message(), "Invalid message");
        assert_eq!(ProtocolError::UnknownType("x".into()).client_message(), "Unknown message type");
    }

    #[test]
    fn test_client_kinds_cover_every_variant() {
        for kind in ClientMessage::KINDS {
            let text = json!({"type": kind, "direction": "up"}).to_string();
            let parsed = ClientMessage::parse(&text).unwrap();
            assert_eq!(parsed.kind(), kind);
        }
    }

    #[test]
    fn test_server_wire_names() {
        let value = serde_json::to_value(ServerMessage::WaitingTimer { time_left: 20 }).unwrap();
        assert_eq!(value, json!({"type": "waitingTimer", "timeLeft": 20}));

        let value = serde_json::to_value(ServerMessage::ReadyTimer { countdown: None }).unwrap();
        assert_eq!(value, json!({"type": "readyTimer", "countdown": null}));

        let value = serde_json::to_value(ServerMessage::StartBarrier).unwrap();
        assert_eq!(value, json!({"type": "gameState"}));

        let value = serde_json::to_value(ServerMessage::Reset).unwrap();
        assert_eq!(value, json!({"type": "reset"}));

        let value = serde_json::to_value(ServerMessage::ForceGameRedirect).unwrap();
        assert_eq!(value, json!({"type": "forceGameRedirect"}));
    }

    #[test]
    fn test_error_shape() {
        let value = serde_json::to_value(ServerMessage::Error(ServerError::new("Nickname missing"))).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "Nickname missing"}));

        let full = ServerError { message: "Game is full".into(), game_full: true };
        let value = serde_json::to_value(ServerMessage::Error(full)).unwrap();
        assert_eq!(value["gameFull"], true);
    }

    #[test]
    fn test_lobby_update_shape() {
        let msg = ServerMessage::LobbyUpdate(LobbyUpdate {
            count: 2,
            players: vec!["ann".into(), "bob".into()],
            game_full: false,
            chat_history: Vec::new(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "lobbyUpdate");
        assert_eq!(value["count"], 2);
        assert_eq!(value["gameFull"], false);
        assert!(value["chatHistory"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_player_moved_shape() {
        let id = PlayerId::from_bytes([1; 16]);
        let msg = ServerMessage::PlayerMoved {
            id,
            position: GridPos::new(2, 1),
            old_position: GridPos::new(1, 1),
        };
        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["oldPosition"], json!({"x": 1, "y": 1}));
        assert_eq!(value["id"], id.to_string());
    }
}
