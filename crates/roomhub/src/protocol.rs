//! Wire format: one JSON object per frame, tagged by `type`. [`ClientMessage`]
//! is what a Connection Endpoint decodes off the wire; [`ServerMessage`] is
//! what the Hub and Match Runner encode back onto it.
use roomhub_db::RoomId;
use roomhub_engine::{Action, State};
use serde::{Deserialize, Serialize};

use crate::session::UserId;

#[derive(Debug, Clone)]
pub enum ProtocolError {
    FrameTooLarge(usize),
    Malformed(String),
    UnknownType(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameTooLarge(n) => write!(f, "frame of {n} bytes exceeds the cap"),
            Self::Malformed(s) => write!(f, "malformed message: {s}"),
            Self::UnknownType(t) => write!(f, "unknown message type: {t}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// The common envelope every frame conforms to before type-specific fields
/// are pulled out. `room_id`/`user_id` are advisory on the wire — the
/// Connection Endpoint always overwrites them with the session's
/// authenticated identity before an inbound message reaches the Hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "player_ready")]
    PlayerReady { ready: bool },
    #[serde(rename = "start_game")]
    StartGame,
    #[serde(rename = "start_multiplayer_game")]
    StartMultiplayerGame,
    #[serde(rename = "multiplayerInit")]
    MultiplayerInit { #[serde(rename = "startingLevel")] starting_level: i64 },
    #[serde(rename = "setLevel")]
    SetLevel { level: i64 },
    #[serde(rename = "game_input")]
    GameInput { action: String },
    #[serde(rename = "game_state")]
    GameState {
        score: u64,
        /// Opaque passthrough payload persisted alongside `score`; the wire
        /// message allows arbitrary extra fields here (`{score, ...}`).
        #[serde(default)]
        state: serde_json::Value,
    },
    #[serde(rename = "player_finished")]
    PlayerFinished { score: u64, lines: u32 },
    #[serde(rename = "spectate_request")]
    SpectateRequest,
    #[serde(rename = "player_disconnect")]
    PlayerDisconnect { reason: String },
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: i64 },
}

impl ClientMessage {
    /// Decodes one frame, enforcing the read-size cap ahead of parsing.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() > roomhub_core::MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge(frame.len()));
        }
        serde_json::from_slice(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// The recognized game action this message carries, if any, parsed
    /// through the engine's own action grammar.
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::GameInput { action } => Action::parse(action),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected { user_id: UserId, room_id: RoomId },
    #[serde(rename = "room_update")]
    RoomUpdate { room: serde_json::Value },
    #[serde(rename = "player_update")]
    PlayerUpdate { user_id: UserId, score: u64 },
    #[serde(rename = "level_changed")]
    LevelChanged { user_id: UserId, level: i64 },
    #[serde(rename = "game_start")]
    GameStart { timestamp: i64, message: String },
    #[serde(rename = "multiplayer_game_started")]
    MultiplayerGameStarted { starting_level: i64, message: String },
    #[serde(rename = "player_game_state")]
    PlayerGameState {
        #[serde(rename = "userID")]
        user_id: UserId,
        #[serde(flatten)]
        state: State,
    },
    #[serde(rename = "player_finished")]
    PlayerFinished {
        #[serde(rename = "playerName")]
        player_name: String,
        score: u64,
        lines: u32,
        position: u32,
    },
    #[serde(rename = "game_complete")]
    GameComplete { results: Vec<Standing> },
    #[serde(rename = "multiplayer_game_ended")]
    MultiplayerGameEnded { message: String },
    #[serde(rename = "match_ended")]
    MatchEnded {
        reason: String,
        #[serde(rename = "playerName")]
        player_name: String,
        message: String,
    },
    #[serde(rename = "player_disconnected")]
    PlayerDisconnected {
        #[serde(rename = "playerName")]
        player_name: String,
        message: String,
    },
    #[serde(rename = "player_reconnected")]
    PlayerReconnected {
        #[serde(rename = "playerName")]
        player_name: String,
        message: String,
    },
    #[serde(rename = "player_disconnected_timeout")]
    PlayerDisconnectedTimeout {
        #[serde(rename = "playerName")]
        player_name: String,
        message: String,
    },
    #[serde(rename = "spectate_data")]
    SpectateData { players: Vec<(UserId, State)> },
    #[serde(rename = "spectate_error")]
    SpectateError { error: String },
    #[serde(rename = "room_closed")]
    RoomClosed { reason: String },
    #[serde(rename = "rooms_updated")]
    RoomsUpdated { removed_rooms: Vec<RoomId>, reason: String },
    #[serde(rename = "error")]
    Error { error: String },
}

/// A single row of `game_complete`'s standings list, serialized for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Standing {
    pub user_id: UserId,
    pub display_name: String,
    pub score: u64,
    pub position: u32,
}

impl From<roomhub_db::Standing> for Standing {
    fn from(s: roomhub_db::Standing) -> Self {
        Self {
            user_id: s.user,
            display_name: s.display_name,
            score: s.score,
            position: s.position,
        }
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serialize server message")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_player_ready() {
        let msg = ClientMessage::decode(br#"{"type":"player_ready","ready":true}"#).unwrap();
        assert!(matches!(msg, ClientMessage::PlayerReady { ready: true }));
    }

    #[test]
    fn decodes_camel_case_variants() {
        let msg = ClientMessage::decode(
            br#"{"type":"multiplayerInit","startingLevel":5}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::MultiplayerInit { starting_level: 5 }
        ));
    }

    #[test]
    fn rejects_oversized_frame() {
        let huge = vec![b'a'; roomhub_core::MAX_FRAME_BYTES + 1];
        assert!(matches!(
            ClientMessage::decode(&huge),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(ClientMessage::decode(br#"{"type":"not_a_thing"}"#).is_err());
    }

    #[test]
    fn game_state_accepts_extra_fields_as_opaque_state() {
        let msg = ClientMessage::decode(
            br#"{"type":"game_state","score":1200,"board":[[0,1],[1,0]]}"#,
        )
        .unwrap();
        let ClientMessage::GameState { score, state } = msg else {
            panic!("expected GameState");
        };
        assert_eq!(score, 1200);
        assert_eq!(state["board"], serde_json::json!([[0, 1], [1, 0]]));
    }

    #[test]
    fn game_state_defaults_state_when_absent() {
        let msg = ClientMessage::decode(br#"{"type":"game_state","score":7}"#).unwrap();
        let ClientMessage::GameState { score, state } = msg else {
            panic!("expected GameState");
        };
        assert_eq!(score, 7);
        assert!(state.is_null());
    }

    #[test]
    fn game_input_extracts_a_parsed_action() {
        let msg = ClientMessage::GameInput {
            action: "hardDrop".into(),
        };
        assert_eq!(msg.action(), Some(Action::HardDrop));
    }

    #[test]
    fn encodes_server_message_with_tag() {
        let msg = ServerMessage::Error {
            error: "bad".into(),
        };
        assert_eq!(msg.to_json(), r#"{"type":"error","error":"bad"}"#);
    }
}
