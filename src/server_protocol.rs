use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ProtocolError, RoomError};
use crate::server_utils::normalize_room_code;
use crate::types::{ConnectionId, RoomId, Slot, Snapshot, Velocity};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    pub room_id: RoomId,
    pub skin_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerInput {
    pub room_id: RoomId,
    pub velocity: Velocity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientIntent {
    CreateRoom { skin_id: u32 },
    JoinRoom(JoinRequest),
    PlayerInput(PlayerInput),
}

pub fn parse_client_message(raw: &str) -> Result<ClientIntent, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::NotAnObject)?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    let message_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    match message_type {
        "createRoom" => Ok(ClientIntent::CreateRoom {
            skin_id: parse_skin_id(object)?,
        }),
        "joinRoom" => Ok(ClientIntent::JoinRoom(JoinRequest {
            room_id: parse_room_id(object)?,
            skin_id: parse_skin_id(object)?,
        })),
        "playerInput" => {
            let room_id = parse_room_id(object)?;
            let vel_x = parse_axis(object, "velX")?;
            let vel_y = parse_axis(object, "velY")?;
            let velocity = Velocity::new(vel_x, vel_y).ok_or(ProtocolError::InvalidVelocity)?;
            Ok(ClientIntent::PlayerInput(PlayerInput { room_id, velocity }))
        }
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

fn parse_room_id(object: &Map<String, Value>) -> Result<RoomId, ProtocolError> {
    let raw = object
        .get("roomId")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::InvalidField("roomId"))?;
    let normalized = normalize_room_code(raw);
    if normalized.is_empty() {
        return Err(ProtocolError::InvalidField("roomId"));
    }
    Ok(normalized)
}

fn parse_skin_id(object: &Map<String, Value>) -> Result<u32, ProtocolError> {
    match object.get("skinId") {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .and_then(|skin| u32::try_from(skin).ok())
            .ok_or(ProtocolError::InvalidField("skinId")),
    }
}

fn parse_axis(object: &Map<String, Value>, key: &'static str) -> Result<i32, ProtocolError> {
    let value = object
        .get(key)
        .and_then(Value::as_i64)
        .ok_or(ProtocolError::InvalidField(key))?;
    match value {
        -1..=1 => Ok(value as i32),
        _ => Err(ProtocolError::InvalidVelocity),
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    JoinedRoom {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "playerId")]
        player_id: ConnectionId,
        role: Slot,
    },
    PlayerJoined {
        #[serde(rename = "playerCount")]
        player_count: usize,
    },
    GameStart,
    GameState(Snapshot),
    PlayerDied {
        #[serde(rename = "playerId")]
        player_id: ConnectionId,
    },
    PlayerLeft,
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &RoomError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    /// Per-tick snapshots may be skipped for a slow client. Everything else
    /// must arrive.
    pub fn droppable(&self) -> bool {
        matches!(self, Self::GameState(_))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// An event addressed to a set of connections.
#[derive(Clone, Debug)]
pub struct Dispatch {
    pub to: Vec<ConnectionId>,
    pub event: ServerEvent,
}

impl Dispatch {
    pub fn one(connection_id: &str, event: ServerEvent) -> Self {
        Self {
            to: vec![connection_id.to_string()],
            event,
        }
    }

    pub fn many(to: Vec<ConnectionId>, event: ServerEvent) -> Self {
        Self { to, event }
    }
}
