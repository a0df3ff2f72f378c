use thiserror::Error;

/// Failures of a room operation. Reported only to the connection that caused
/// them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("not a member of room {0}")]
    NotInRoom(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A client frame that could not be turned into an intent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message is not a json object")]
    NotAnObject,
    #[error("missing message type")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("missing or invalid field: {0}")]
    InvalidField(&'static str),
    #[error("velocity must be one of the four unit steps or zero")]
    InvalidVelocity,
}

impl From<ProtocolError> for RoomError {
    fn from(err: ProtocolError) -> Self {
        RoomError::InvalidInput(err.to_string())
    }
}
