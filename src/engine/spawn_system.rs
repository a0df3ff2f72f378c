use crate::constants::{SPAWN_ATTEMPTS, TILE_COUNT};

use super::*;

impl GameEngine {
    /// Uniform food cell, rerolled a bounded number of times while it lands on
    /// a snake.
    pub(super) fn pick_food_cell(&mut self) -> Vec2 {
        let mut cell = self.rng.cell(TILE_COUNT, TILE_COUNT);
        for _ in 1..SPAWN_ATTEMPTS {
            if !self.is_occupied(cell) {
                break;
            }
            cell = self.rng.cell(TILE_COUNT, TILE_COUNT);
        }
        cell
    }

    /// Death and wall exit both land here: fresh length-3 snake at a random
    /// spot, standing still, score cleared.
    pub(super) fn reset_player(&mut self, idx: usize) {
        let head = self.pick_respawn_head(idx);
        let player = &mut self.players[idx];
        player.view.x = head.x;
        player.view.y = head.y;
        player.view.vel_x = 0;
        player.view.vel_y = 0;
        player.view.score = 0;
        player.view.body = respawn_body(head);
        player.heading = Velocity::ZERO;
    }

    pub(super) fn is_occupied(&self, cell: Vec2) -> bool {
        self.players
            .iter()
            .any(|player| player.view.body.contains(&cell))
    }

    fn pick_respawn_head(&mut self, idx: usize) -> Vec2 {
        // body trails +y, keep the tail on the board
        let max_y = TILE_COUNT - (INITIAL_BODY_LEN as i32 - 1);
        let mut head = self.rng.cell(TILE_COUNT, max_y);
        for _ in 1..SPAWN_ATTEMPTS {
            let blocked = respawn_body(head)
                .iter()
                .any(|cell| self.is_occupied_by_other(*cell, idx));
            if !blocked {
                break;
            }
            head = self.rng.cell(TILE_COUNT, max_y);
        }
        head
    }

    fn is_occupied_by_other(&self, cell: Vec2, idx: usize) -> bool {
        self.players
            .iter()
            .enumerate()
            .any(|(other, player)| other != idx && player.view.body.contains(&cell))
    }
}

fn respawn_body(head: Vec2) -> VecDeque<Vec2> {
    (0..INITIAL_BODY_LEN as i32)
        .map(|offset| Vec2 {
            x: head.x,
            y: head.y + offset,
        })
        .collect()
}
