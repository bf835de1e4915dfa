//! Seed commitments for provably fair deals
//!
//! The seed that shuffles a matching board or generates a recall sequence is
//! drawn server-side when the deposit confirms. While the game runs the
//! session only carries `sha256(session_id || seed)`; the seed itself is
//! revealed once the game ends, so a player can check the deal afterwards
//! but cannot rebuild it during play.

use crate::session::SessionId;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Where game seeds come from.
pub trait SeedSource: Send + Sync {
    fn next_seed(&self) -> u64;
}

/// Seeds from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&self) -> u64 {
        OsRng.next_u64()
    }
}

/// Hands out the same seed every time (for testing and replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedSeedSource(pub u64);

impl SeedSource for FixedSeedSource {
    fn next_seed(&self) -> u64 {
        self.0
    }
}

/// Hex commitment published while the game is running.
pub fn commit_seed(session_id: &SessionId, seed: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.to_string().as_bytes());
    hasher.update(seed.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Checks a revealed seed against the commitment shown during play.
pub fn verify_seed(session_id: &SessionId, seed: u64, commitment: &str) -> bool {
    commit_seed(session_id, seed) == commitment
}
