use std::collections::{BTreeMap, VecDeque};

use crate::constants::{in_bounds, slot_spawn, FOOD_SCORE, INITIAL_BODY_LEN};
use crate::rng::Rng;
use crate::types::{ConnectionId, PlayerView, RuntimeEvent, Slot, Snapshot, Vec2, Velocity};

mod collision;
mod spawn_system;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputDecision {
    Accepted,
    /// Exact reversal of the current direction; the buffer is left untouched.
    RejectedReversal,
}

#[derive(Clone, Debug)]
struct PlayerInternal {
    view: PlayerView,
    /// Velocity actually applied on the last tick the player moved.
    heading: Velocity,
}

/// Authoritative state of one duel: snakes in join order plus the food cell.
///
/// `step` is the only place positions change. Inputs only touch the velocity
/// buffer, so everything received between two ticks takes effect together on
/// the next one.
#[derive(Clone, Debug)]
pub struct GameEngine {
    rng: Rng,
    players: Vec<PlayerInternal>,
    food: Vec2,
    tick_counter: u64,
}

impl GameEngine {
    pub fn new(seed: u32) -> Self {
        let mut engine = Self {
            rng: Rng::new(seed),
            players: Vec::new(),
            food: Vec2 { x: 0, y: 0 },
            tick_counter: 0,
        };
        engine.food = engine.pick_food_cell();
        engine
    }

    /// Seats a player at the spawn of `slot`. Returns false when the id or the
    /// slot is already taken.
    pub fn add_player(&mut self, id: &str, slot: Slot, skin_id: u32) -> bool {
        if self.has_player(id) || self.players.iter().any(|p| p.view.role == slot) {
            return false;
        }

        let head = slot_spawn(slot);
        let body: VecDeque<Vec2> = (0..INITIAL_BODY_LEN as i32)
            .map(|offset| Vec2 {
                x: head.x - offset,
                y: head.y,
            })
            .collect();
        self.players.push(PlayerInternal {
            view: PlayerView {
                id: id.to_string(),
                role: slot,
                skin_id,
                x: head.x,
                y: head.y,
                vel_x: 0,
                vel_y: 0,
                score: 0,
                body,
            },
            heading: Velocity::ZERO,
        });

        if self.is_occupied(self.food) {
            self.food = self.pick_food_cell();
        }
        true
    }

    pub fn remove_player(&mut self, id: &str) -> Option<PlayerView> {
        let idx = self.player_index(id)?;
        Some(self.players.remove(idx).view)
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.player_index(id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: &str) -> Option<&PlayerView> {
        self.players
            .iter()
            .find(|player| player.view.id == id)
            .map(|player| &player.view)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerView> {
        self.players.iter().map(|player| &player.view)
    }

    pub fn player_ids(&self) -> Vec<ConnectionId> {
        self.players
            .iter()
            .map(|player| player.view.id.clone())
            .collect()
    }

    pub fn heading(&self, id: &str) -> Option<Velocity> {
        self.player_index(id).map(|idx| self.players[idx].heading)
    }

    /// First slot nobody occupies, P1 before P2.
    pub fn free_slot(&self) -> Option<Slot> {
        [Slot::P1, Slot::P2]
            .into_iter()
            .find(|slot| !self.players.iter().any(|p| p.view.role == *slot))
    }

    pub fn food(&self) -> Vec2 {
        self.food
    }

    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    /// Buffers a direction change for the next tick. `None` if the player is
    /// not part of this engine.
    pub fn receive_input(&mut self, id: &str, velocity: Velocity) -> Option<InputDecision> {
        let idx = self.player_index(id)?;
        let player = &mut self.players[idx];
        if velocity.is_reverse_of(player.view.velocity()) || velocity.is_reverse_of(player.heading)
        {
            return Some(InputDecision::RejectedReversal);
        }
        player.view.vel_x = velocity.x();
        player.view.vel_y = velocity.y();
        Some(InputDecision::Accepted)
    }

    /// Advances the duel by one tick.
    pub fn step(&mut self) -> Vec<RuntimeEvent> {
        self.tick_counter += 1;
        let mut events = Vec::new();
        for idx in 0..self.players.len() {
            self.advance_player(idx, &mut events);
        }
        self.resolve_body_collisions(&mut events);
        events
    }

    pub fn build_snapshot(&self) -> Snapshot {
        let players: BTreeMap<ConnectionId, PlayerView> = self
            .players
            .iter()
            .map(|player| (player.view.id.clone(), player.view.clone()))
            .collect();
        Snapshot {
            players,
            food: self.food,
        }
    }

    fn advance_player(&mut self, idx: usize, events: &mut Vec<RuntimeEvent>) {
        let velocity = self.players[idx].view.velocity();
        if velocity.is_zero() {
            return;
        }
        self.players[idx].heading = velocity;

        let next = self.players[idx].view.head().offset(velocity);
        if !in_bounds(next) {
            self.reset_player(idx);
            events.push(RuntimeEvent::WallReset {
                player_id: self.players[idx].view.id.clone(),
            });
            return;
        }

        let ate = next == self.food;
        {
            let player = &mut self.players[idx].view;
            player.x = next.x;
            player.y = next.y;
            player.body.push_front(next);
            if ate {
                player.score += FOOD_SCORE;
                events.push(RuntimeEvent::FoodEaten {
                    player_id: player.id.clone(),
                    score: player.score,
                });
            } else {
                player.body.pop_back();
            }
        }
        if ate {
            self.food = self.pick_food_cell();
        }
    }

    fn player_index(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|player| player.view.id == id)
    }
}
