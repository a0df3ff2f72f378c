use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::constants::MAX_PLAYERS_PER_ROOM;
use crate::engine::InputDecision;
use crate::error::RoomError;
use crate::room::{Room, TickScheduler};
use crate::server_protocol::{Dispatch, JoinRequest, PlayerInput, ServerEvent};
use crate::server_utils::{generate_room_code, normalize_room_code};
use crate::types::{ConnectionId, RoomId, RoomStatus, RuntimeEvent, Slot};

#[derive(Clone, Copy, Debug, Default)]
pub struct RegistryOptions {
    /// Fixes room codes and per-room engine seeds.
    pub seed: Option<u64>,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub room_id: RoomId,
    pub dispatches: Vec<Dispatch>,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    pub slot: Slot,
    pub started: bool,
    pub dispatches: Vec<Dispatch>,
}

#[derive(Debug)]
pub struct RemoveOutcome {
    pub room_id: RoomId,
    pub slot: Slot,
    pub closed: bool,
    pub dispatches: Vec<Dispatch>,
}

/// Every open room, plus which room each connection sits in.
///
/// Operations never talk to sockets. They return the events to send and who
/// should receive them.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    room_by_connection: HashMap<ConnectionId, RoomId>,
    rng: StdRng,
}

impl RoomRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rooms: HashMap::new(),
            room_by_connection: HashMap::new(),
            rng,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(&normalize_room_code(room_id))
    }

    pub fn room_status(&self, room_id: &str) -> Option<RoomStatus> {
        self.room(room_id).map(Room::status)
    }

    pub fn room_of(&self, connection_id: &str) -> Option<&str> {
        self.room_by_connection
            .get(connection_id)
            .map(String::as_str)
    }

    /// Opens a room with the caller seated as P1. A connection already seated
    /// elsewhere leaves that room first.
    pub fn create_room(&mut self, connection_id: &str, skin_id: u32) -> CreateOutcome {
        let mut dispatches = self.detach(connection_id);

        let room_id = self.unique_room_code();
        let seed = self.rng.random::<u32>();
        let room = Room::with_creator(room_id.clone(), seed, connection_id, skin_id);
        let snapshot = room.snapshot();
        self.rooms.insert(room_id.clone(), room);
        self.room_by_connection
            .insert(connection_id.to_string(), room_id.clone());

        info!(room = %room_id, connection = connection_id, skin_id, "room created");

        dispatches.push(Dispatch::one(
            connection_id,
            ServerEvent::RoomCreated {
                room_id: room_id.clone(),
            },
        ));
        dispatches.push(Dispatch::one(
            connection_id,
            ServerEvent::JoinedRoom {
                room_id: room_id.clone(),
                player_id: connection_id.to_string(),
                role: Slot::P1,
            },
        ));
        dispatches.push(Dispatch::one(connection_id, ServerEvent::GameState(snapshot)));

        CreateOutcome {
            room_id,
            dispatches,
        }
    }

    pub fn join_room(
        &mut self,
        connection_id: &str,
        request: &JoinRequest,
        scheduler: &mut dyn TickScheduler,
    ) -> Result<JoinOutcome, RoomError> {
        let room_id = normalize_room_code(&request.room_id);
        let Some(room) = self.rooms.get(&room_id) else {
            return Err(RoomError::RoomNotFound);
        };
        if room.has_player(connection_id) {
            return Err(RoomError::InvalidInput(
                "already seated in this room".to_string(),
            ));
        }
        if room.player_count() >= MAX_PLAYERS_PER_ROOM {
            return Err(RoomError::RoomFull);
        }

        let mut dispatches = self.detach(connection_id);
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::RoomNotFound)?;
        let result = room.join(connection_id, request.skin_id, scheduler)?;
        let already_running = !result.started && room.status() == RoomStatus::Running;
        let members = room.member_ids();
        self.room_by_connection
            .insert(connection_id.to_string(), room_id.clone());

        info!(
            room = %room_id,
            connection = connection_id,
            role = result.slot.as_str(),
            started = result.started,
            "player joined"
        );

        dispatches.push(Dispatch::one(
            connection_id,
            ServerEvent::JoinedRoom {
                room_id: room_id.clone(),
                player_id: connection_id.to_string(),
                role: result.slot,
            },
        ));
        dispatches.push(Dispatch::many(
            members.clone(),
            ServerEvent::PlayerJoined {
                player_count: members.len(),
            },
        ));
        if result.started {
            dispatches.push(Dispatch::many(members, ServerEvent::GameStart));
        } else if already_running {
            dispatches.push(Dispatch::one(connection_id, ServerEvent::GameStart));
        }

        Ok(JoinOutcome {
            room_id,
            slot: result.slot,
            started: result.started,
            dispatches,
        })
    }

    pub fn apply_input(
        &mut self,
        connection_id: &str,
        input: &PlayerInput,
    ) -> Result<InputDecision, RoomError> {
        let room_id = normalize_room_code(&input.room_id);
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::RoomNotFound)?;
        let decision = room.apply_input(connection_id, input.velocity)?;
        if decision == InputDecision::RejectedReversal {
            debug!(room = %room_id, connection = connection_id, "reversal ignored");
        }
        Ok(decision)
    }

    /// Detaches a player. An emptied room is closed and deleted; otherwise the
    /// remaining member is told the opponent left.
    pub fn remove_player(&mut self, room_id: &str, connection_id: &str) -> Option<RemoveOutcome> {
        let room_id = normalize_room_code(room_id);
        let room = self.rooms.get_mut(&room_id)?;
        let slot = room.leave(connection_id)?;
        let closed = room.status() == RoomStatus::Closed;
        let remaining = room.member_ids();

        if self.room_by_connection.get(connection_id) == Some(&room_id) {
            self.room_by_connection.remove(connection_id);
        }

        let mut dispatches = Vec::new();
        if closed {
            self.rooms.remove(&room_id);
            info!(room = %room_id, "room closed");
        } else {
            info!(room = %room_id, connection = connection_id, "player left");
            dispatches.push(Dispatch::many(remaining, ServerEvent::PlayerLeft));
        }

        Some(RemoveOutcome {
            room_id,
            slot,
            closed,
            dispatches,
        })
    }

    /// Connection closed: leave whatever room it was in.
    pub fn disconnect(&mut self, connection_id: &str) -> Option<RemoveOutcome> {
        let room_id = self.room_by_connection.get(connection_id)?.clone();
        self.remove_player(&room_id, connection_id)
    }

    /// Runs one tick. `None` means the room is gone or idle and its tick task
    /// should stop.
    pub fn tick_room(&mut self, room_id: &str) -> Option<Vec<Dispatch>> {
        let room = self.rooms.get_mut(room_id)?;
        let (events, snapshot) = room.tick()?;
        let members = room.member_ids();

        let mut dispatches = Vec::new();
        for event in events {
            match event {
                RuntimeEvent::PlayerDied { player_id } => {
                    debug!(room = room_id, player = %player_id, "player died");
                    dispatches.push(Dispatch::many(
                        members.clone(),
                        ServerEvent::PlayerDied { player_id },
                    ));
                }
                RuntimeEvent::WallReset { player_id } => {
                    debug!(room = room_id, player = %player_id, "player hit wall");
                }
                RuntimeEvent::FoodEaten { player_id, score } => {
                    debug!(room = room_id, player = %player_id, score, "food eaten");
                }
            }
        }
        dispatches.push(Dispatch::many(members, ServerEvent::GameState(snapshot)));
        Some(dispatches)
    }

    /// Closes every room and releases every tick task.
    pub fn shutdown(&mut self) -> usize {
        let count = self.rooms.len();
        for room in self.rooms.values_mut() {
            room.close();
        }
        self.rooms.clear();
        self.room_by_connection.clear();
        count
    }

    fn detach(&mut self, connection_id: &str) -> Vec<Dispatch> {
        self.disconnect(connection_id)
            .map(|outcome| outcome.dispatches)
            .unwrap_or_default()
    }

    fn unique_room_code(&mut self) -> RoomId {
        loop {
            let code = generate_room_code(&mut self.rng);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}
