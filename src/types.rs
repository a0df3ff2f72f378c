use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

pub type ConnectionId = String;
pub type RoomId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub fn offset(self, velocity: Velocity) -> Self {
        Self {
            x: self.x + velocity.x,
            y: self.y + velocity.y,
        }
    }
}

/// Buffered direction of travel. Only the four unit steps and standing still
/// are representable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Velocity {
    x: i32,
    y: i32,
}

impl Velocity {
    pub const ZERO: Self = Self { x: 0, y: 0 };
    pub const UP: Self = Self { x: 0, y: -1 };
    pub const DOWN: Self = Self { x: 0, y: 1 };
    pub const LEFT: Self = Self { x: -1, y: 0 };
    pub const RIGHT: Self = Self { x: 1, y: 0 };

    pub fn new(x: i32, y: i32) -> Option<Self> {
        match (x, y) {
            (0, 0) | (1, 0) | (-1, 0) | (0, 1) | (0, -1) => Some(Self { x, y }),
            _ => None,
        }
    }

    pub fn x(self) -> i32 {
        self.x
    }

    pub fn y(self) -> i32 {
        self.y
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    pub fn is_reverse_of(self, other: Velocity) -> bool {
        !self.is_zero() && self.x == -other.x && self.y == -other.y
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    P1,
    P2,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::P1 => "p1",
            Self::P2 => "p2",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomStatus {
    WaitingForPlayers,
    Running,
    Closed,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: ConnectionId,
    pub role: Slot,
    #[serde(rename = "skinId")]
    pub skin_id: u32,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "velX")]
    pub vel_x: i32,
    #[serde(rename = "velY")]
    pub vel_y: i32,
    pub score: u32,
    pub body: VecDeque<Vec2>,
}

impl PlayerView {
    pub fn head(&self) -> Vec2 {
        Vec2 {
            x: self.x,
            y: self.y,
        }
    }

    pub fn velocity(&self) -> Velocity {
        Velocity::new(self.vel_x, self.vel_y).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub players: BTreeMap<ConnectionId, PlayerView>,
    pub food: Vec2,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeEvent {
    PlayerDied { player_id: ConnectionId },
    WallReset { player_id: ConnectionId },
    FoodEaten { player_id: ConnectionId, score: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_rejects_diagonals_and_long_steps() {
        assert!(Velocity::new(1, 1).is_none());
        assert!(Velocity::new(2, 0).is_none());
        assert!(Velocity::new(0, -2).is_none());
        assert_eq!(Velocity::new(-1, 0), Some(Velocity::LEFT));
        assert_eq!(Velocity::new(0, 0), Some(Velocity::ZERO));
    }

    #[test]
    fn reverse_ignores_standing_still() {
        assert!(Velocity::LEFT.is_reverse_of(Velocity::RIGHT));
        assert!(Velocity::UP.is_reverse_of(Velocity::DOWN));
        assert!(!Velocity::UP.is_reverse_of(Velocity::LEFT));
        assert!(!Velocity::ZERO.is_reverse_of(Velocity::ZERO));
    }

    #[test]
    fn player_view_uses_wire_field_names() {
        let view = PlayerView {
            id: "client_1".to_string(),
            role: Slot::P2,
            skin_id: 3,
            x: 4,
            y: 5,
            vel_x: 1,
            vel_y: 0,
            score: 20,
            body: VecDeque::from(vec![Vec2 { x: 4, y: 5 }]),
        };
        let value = serde_json::to_value(&view).expect("player view serializes");
        assert_eq!(value["role"], "p2");
        assert_eq!(value["skinId"], 3);
        assert_eq!(value["velX"], 1);
        assert_eq!(value["body"][0]["y"], 5);
    }
}
