//! Deterministic random stream shared by every stage of a generation run.
//!
//! All randomness in a run flows through one `RandomStream`. Two streams
//! created from the same seed produce identical draws as long as the calls
//! are made in the same order.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Debug)]
pub struct RandomStream {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        RandomStream {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this stream was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A non-negative integer in `[0, i32::MAX)`.
    pub fn next_int(&mut self) -> i32 {
        self.rng.gen_range(0..i32::MAX)
    }

    /// An integer in `[min, max)`. Returns `min` when the range is empty.
    pub fn range(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    /// An integer in `[min, max]`. Returns `min` when `max < min`.
    pub fn range_inclusive(&mut self, min: i32, max: i32) -> i32 {
        if max < min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// A double in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Derive the stream for the next global attempt from this one.
    pub fn reseeded(&mut self) -> RandomStream {
        RandomStream::new(self.next_int() as u64)
    }
}
