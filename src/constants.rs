use crate::types::{Slot, Vec2};

pub const TICK_RATE: u32 = 8;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const GRID_SIZE: i32 = 30;
pub const CANVAS_SIZE: i32 = 600;
pub const TILE_COUNT: i32 = CANVAS_SIZE / GRID_SIZE;

pub const FOOD_SCORE: u32 = 10;
pub const INITIAL_BODY_LEN: usize = 3;
pub const MAX_PLAYERS_PER_ROOM: usize = 2;

pub const ROOM_CODE_LEN: usize = 6;
pub const ROOM_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Upper bound on rerolls when looking for an unoccupied cell.
pub const SPAWN_ATTEMPTS: usize = 32;

pub const OUTBOUND_QUEUE_LEN: usize = 256;

/// Head cell each slot starts from. The body trails towards -x.
pub fn slot_spawn(slot: Slot) -> Vec2 {
    match slot {
        Slot::P1 => Vec2 { x: 5, y: 10 },
        Slot::P2 => Vec2 { x: 15, y: 10 },
    }
}

pub fn in_bounds(cell: Vec2) -> bool {
    (0..TILE_COUNT).contains(&cell.x) && (0..TILE_COUNT).contains(&cell.y)
}
