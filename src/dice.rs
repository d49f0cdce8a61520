//! Randomness for purely cosmetic page details.
//!
//! The views roll dice for decoration only ("Continued on Page A12", the
//! issue number), so a small seedable generator is all that's needed.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of cosmetic randomness.
pub trait Dice: Send {
    fn next_u64(&mut self) -> u64;

    /// A value in `0..bound`. `bound` must be non-zero.
    fn below(&mut self, bound: u32) -> u32 {
        (self.next_u64() % u64::from(bound)) as u32
    }

    fn coin(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }
}

/// SplitMix64 generator.
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn seeded(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed from the system clock.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed);
        Self::seeded(nanos)
    }
}

impl Dice for SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}
