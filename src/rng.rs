use crate::types::Vec2;

/// Small seeded generator so a room seed replays the same food and respawn
/// sequence.
#[derive(Clone, Debug)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6d2b79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform integer in `[0, bound)`. Returns 0 for an empty range.
    pub fn below(&mut self, bound: u32) -> u32 {
        if bound <= 1 {
            return 0;
        }
        ((self.next_u32() as u64 * bound as u64) >> 32) as u32
    }

    /// Uniform cell with `x` in `[0, width)` and `y` in `[0, height)`.
    pub fn cell(&mut self, width: i32, height: i32) -> Vec2 {
        let x = self.below(width.max(0) as u32) as i32;
        let y = self.below(height.max(0) as u32) as i32;
        Vec2 { x, y }
    }
}
