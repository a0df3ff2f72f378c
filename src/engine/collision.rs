use super::*;

impl GameEngine {
    /// Checks heads against bodies once all snakes have moved, in join order.
    /// A hit resets the mover at once, so later movers are checked against
    /// its respawned body. In a head-on meet only the earlier joiner dies.
    pub(super) fn resolve_body_collisions(&mut self, events: &mut Vec<RuntimeEvent>) {
        for mover in 0..self.players.len() {
            if !self.head_hits_body(mover) {
                continue;
            }
            events.push(RuntimeEvent::PlayerDied {
                player_id: self.players[mover].view.id.clone(),
            });
            self.reset_player(mover);
        }
    }

    fn head_hits_body(&self, mover: usize) -> bool {
        let head = self.players[mover].view.head();
        self.players.iter().enumerate().any(|(target, player)| {
            player
                .view
                .body
                .iter()
                .enumerate()
                .any(|(segment, cell)| !(target == mover && segment == 0) && *cell == head)
        })
    }
}
