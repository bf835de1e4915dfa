//! Cancelable countdowns for timed phase transitions.
//!
//! A timed state arms its countdown on entry and cancels it on exit. Every
//! arm/cancel bumps a generation number, so an expiry computed against an old
//! generation can be recognised and dropped.

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Countdown {
    remaining: Option<Duration>,
    generation: u64,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the countdown and returns its generation.
    pub fn arm(&mut self, duration: Duration) -> u64 {
        self.generation += 1;
        self.remaining = Some(duration);
        self.generation
    }

    pub fn cancel(&mut self) {
        if self.remaining.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time left, zero when idle.
    pub fn remaining(&self) -> Duration {
        self.remaining.unwrap_or(Duration::ZERO)
    }

    /// Whole seconds left, rounded up (what a countdown display shows).
    pub fn remaining_secs_ceil(&self) -> u64 {
        let remaining = self.remaining();
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Moves time forward. Returns `true` exactly once, on the step that
    /// reaches zero; the countdown is disarmed at that point.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        match self.remaining {
            Some(left) if elapsed >= left => {
                self.remaining = None;
                true
            }
            Some(left) => {
                self.remaining = Some(left - elapsed);
                false
            }
            None => false,
        }
    }

    /// Like [`Countdown::advance`], but only if `generation` is still current.
    pub fn advance_for(&mut self, generation: u64, elapsed: Duration) -> bool {
        if generation != self.generation {
            return false;
        }
        self.advance(elapsed)
    }
}
