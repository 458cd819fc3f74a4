//! Deterministic pseudo-random stream derived from a string key.
//!
//! All synthetic data and injected faults draw from this generator, so the
//! same key produces bit-identical output on every run and platform. The
//! recurrence is the classic `seed = (seed * 9301 + 49297) mod 233280`, all in
//! integer arithmetic; only the final division produces a float.

const MULTIPLIER: u64 = 9301;
const INCREMENT: u64 = 49297;
const MODULUS: u64 = 233280;

/// Hash a key into a non-negative seed.
///
/// Rolling `hash * 31 + code` over the key's UTF-16 code units in wrapping
/// 32-bit arithmetic, then the absolute value.
pub fn seed_from_key(key: &str) -> u64 {
    let hash = key.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    });
    u64::from(hash.unsigned_abs())
}

/// Restartable float stream in `[0, 1)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededSequence {
    state: u64,
}

impl SeededSequence {
    pub fn new(key: &str) -> Self {
        Self {
            state: seed_from_key(key),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0, 1)`
    pub fn next_f64(&mut self) -> f64 {
        self.state = (self.state % MODULUS * MULTIPLIER + INCREMENT) % MODULUS;
        self.state as f64 / MODULUS as f64
    }

    pub fn next_f32(&mut self) -> f32 {
        self.next_f64() as f32
    }

    /// Uniform value in `[low, high)`
    pub fn range(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Uniform integer in `[low, high]`
    pub fn range_inclusive(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low + 1) as f64;
        low + ((self.next_f64() * span) as usize).min(high - low)
    }

    /// True with probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

impl Iterator for SeededSequence {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_f64())
    }
}
