use tokio::task::AbortHandle;

use crate::constants::MAX_PLAYERS_PER_ROOM;
use crate::engine::{GameEngine, InputDecision};
use crate::error::RoomError;
use crate::types::{ConnectionId, RoomId, RoomStatus, RuntimeEvent, Slot, Snapshot, Velocity};

/// Cancellation handle for a room's periodic tick task.
#[derive(Debug, Default)]
pub struct Ticker {
    handle: Option<AbortHandle>,
}

impl Ticker {
    pub fn new(handle: AbortHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// A ticker with no task behind it. Used when ticks are driven by hand.
    pub fn detached() -> Self {
        Self { handle: None }
    }

    /// Stops the task. Safe to call any number of times.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Creates the tick task for a room entering `Running`.
pub trait TickScheduler {
    fn schedule(&mut self, room_id: &str) -> Ticker;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinResult {
    pub slot: Slot,
    /// True only on the transition to `Running`.
    pub started: bool,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    status: RoomStatus,
    engine: GameEngine,
    ticker: Option<Ticker>,
}

impl Room {
    pub fn new(id: RoomId, seed: u32) -> Self {
        Self {
            id,
            status: RoomStatus::WaitingForPlayers,
            engine: GameEngine::new(seed),
            ticker: None,
        }
    }

    /// A fresh room with its creator already seated as P1.
    pub fn with_creator(id: RoomId, seed: u32, connection_id: &str, skin_id: u32) -> Self {
        let mut room = Self::new(id, seed);
        room.engine.add_player(connection_id, Slot::P1, skin_id);
        room
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn player_count(&self) -> usize {
        self.engine.player_count()
    }

    pub fn has_player(&self, connection_id: &str) -> bool {
        self.engine.has_player(connection_id)
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.engine.player_ids()
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Seats a connection in the first free slot. The second player of a room
    /// that has never run starts it through `scheduler`.
    pub fn join(
        &mut self,
        connection_id: &str,
        skin_id: u32,
        scheduler: &mut dyn TickScheduler,
    ) -> Result<JoinResult, RoomError> {
        if self.status == RoomStatus::Closed {
            return Err(RoomError::RoomNotFound);
        }
        if self.player_count() >= MAX_PLAYERS_PER_ROOM {
            return Err(RoomError::RoomFull);
        }
        let slot = self.engine.free_slot().ok_or(RoomError::RoomFull)?;
        if !self.engine.add_player(connection_id, slot, skin_id) {
            return Err(RoomError::InvalidInput(
                "connection is already seated in this room".to_string(),
            ));
        }

        let started = self.status == RoomStatus::WaitingForPlayers
            && self.player_count() == MAX_PLAYERS_PER_ROOM;
        if started {
            self.status = RoomStatus::Running;
            self.ticker = Some(scheduler.schedule(&self.id));
        }
        Ok(JoinResult { slot, started })
    }

    /// Removes a member. The room closes itself once empty.
    pub fn leave(&mut self, connection_id: &str) -> Option<Slot> {
        let removed = self.engine.remove_player(connection_id)?;
        if self.player_count() == 0 {
            self.close();
        }
        Some(removed.role)
    }

    pub fn apply_input(
        &mut self,
        connection_id: &str,
        velocity: Velocity,
    ) -> Result<InputDecision, RoomError> {
        self.engine
            .receive_input(connection_id, velocity)
            .ok_or_else(|| RoomError::NotInRoom(self.id.clone()))
    }

    /// One simulation step. Rooms that are not running do not advance.
    pub fn tick(&mut self) -> Option<(Vec<RuntimeEvent>, Snapshot)> {
        if self.status != RoomStatus::Running {
            return None;
        }
        let events = self.engine.step();
        Some((events, self.engine.build_snapshot()))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.build_snapshot()
    }

    /// Releases the tick task and marks the room closed. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
        self.status = RoomStatus::Closed;
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct CountingScheduler {
        pub scheduled: Vec<String>,
    }

    impl TickScheduler for CountingScheduler {
        fn schedule(&mut self, room_id: &str) -> Ticker {
            self.scheduled.push(room_id.to_string());
            Ticker::detached()
        }
    }

    #[test]
    fn second_join_starts_room_once() {
        let mut scheduler = CountingScheduler::default();
        let mut room = Room::new("ABC123".to_string(), 1);

        let first = room.join("c1", 0, &mut scheduler).expect("first join");
        assert_eq!(first, JoinResult { slot: Slot::P1, started: false });
        assert_eq!(room.status(), RoomStatus::WaitingForPlayers);
        assert!(!room.is_ticking());

        let second = room.join("c2", 1, &mut scheduler).expect("second join");
        assert_eq!(second, JoinResult { slot: Slot::P2, started: true });
        assert_eq!(room.status(), RoomStatus::Running);
        assert!(room.is_ticking());
        assert_eq!(scheduler.scheduled, vec!["ABC123".to_string()]);

        assert_eq!(room.join("c3", 0, &mut scheduler), Err(RoomError::RoomFull));
    }

    #[test]
    fn rejoin_after_leave_fills_vacant_slot_without_restarting() {
        let mut scheduler = CountingScheduler::default();
        let mut room = Room::new("ROOM01".to_string(), 2);
        room.join("c1", 0, &mut scheduler).expect("c1 joins");
        room.join("c2", 0, &mut scheduler).expect("c2 joins");

        assert_eq!(room.leave("c1"), Some(Slot::P1));
        assert_eq!(room.status(), RoomStatus::Running);
        assert!(room.is_ticking());

        let rejoin = room.join("c3", 0, &mut scheduler).expect("c3 joins");
        assert_eq!(rejoin, JoinResult { slot: Slot::P1, started: false });
        assert_eq!(scheduler.scheduled.len(), 1);
    }

    #[test]
    fn last_leave_closes_room() {
        let mut scheduler = CountingScheduler::default();
        let mut room = Room::new("ROOM02".to_string(), 3);
        room.join("c1", 0, &mut scheduler).expect("c1 joins");
        room.join("c2", 0, &mut scheduler).expect("c2 joins");

        room.leave("c1");
        room.leave("c2");
        assert_eq!(room.status(), RoomStatus::Closed);
        assert!(!room.is_ticking());
        assert_eq!(room.join("c3", 0, &mut scheduler), Err(RoomError::RoomNotFound));

        room.close();
        assert_eq!(room.status(), RoomStatus::Closed);
    }

    #[test]
    fn waiting_room_does_not_tick() {
        let mut scheduler = CountingScheduler::default();
        let mut room = Room::new("ROOM03".to_string(), 4);
        room.join("c1", 0, &mut scheduler).expect("c1 joins");
        assert!(room.tick().is_none());
        assert_eq!(room.engine().tick_counter(), 0);
    }

    #[test]
    fn input_from_stranger_is_not_in_room() {
        let mut scheduler = CountingScheduler::default();
        let mut room = Room::new("ROOM04".to_string(), 5);
        room.join("c1", 0, &mut scheduler).expect("c1 joins");
        assert_eq!(
            room.apply_input("c9", Velocity::UP),
            Err(RoomError::NotInRoom("ROOM04".to_string()))
        );
        assert_eq!(room.apply_input("c1", Velocity::UP), Ok(InputDecision::Accepted));
    }

    #[tokio::test]
    async fn close_aborts_tick_task_and_is_idempotent() {
        let task = tokio::spawn(std::future::pending::<()>());
        let mut ticker = Ticker::new(task.abort_handle());
        ticker.cancel();
        ticker.cancel();

        let joined = task.await;
        assert!(joined.expect_err("task was aborted").is_cancelled());
    }
}
