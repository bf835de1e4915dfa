//! Deterministic symbol sequences for the recall game.
//!
//! Fairness is rule-based rather than secrecy-based, so a plain linear
//! congruential generator is enough: the same seed always replays the same
//! sequence, which also lets an observer re-derive a session after the fact.

const LCG_MULTIPLIER: u128 = 9301;
const LCG_INCREMENT: u128 = 49297;
const LCG_MODULUS: u128 = 233_280;

/// Infinite iterator over symbols in `[0, symbols)`.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    state: u128,
    symbols: u32,
}

impl SequenceGenerator {
    /// `symbols` must be non-zero.
    pub fn new(seed: u64, symbols: u32) -> Self {
        Self {
            state: seed as u128,
            symbols: symbols.max(1),
        }
    }
}

impl Iterator for SequenceGenerator {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        // floor(state / modulus * symbols) without going through floats
        Some((self.state * self.symbols as u128 / LCG_MODULUS) as u32)
    }
}

/// First `length` symbols for `seed`.
pub fn generate(seed: u64, length: usize, symbols: u32) -> Vec<u32> {
    SequenceGenerator::new(seed, symbols).take(length).collect()
}
