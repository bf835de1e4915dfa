//! Reflex-tap rules.
//!
//! A board of random digits and a target digit are on display. Tapping the
//! target scores and redraws both; tapping anything else costs a penalty,
//! floored at zero. The run lasts a fixed number of seconds.

use super::timer::Countdown;
use super::types::{GamePhase, InputEffect, MoveError, ReflexProgress, ReflexRules};
use crate::amount::PerformanceRatio;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

pub struct ReflexGame {
    rules: ReflexRules,
    phase: GamePhase,
    board: Vec<u8>,
    hit_target: u8,
    score: u64,
    hits: u32,
    misses: u32,
    clock: Countdown,
    rng: StdRng,
}

impl ReflexGame {
    pub fn new(rules: ReflexRules, seed: u64) -> Self {
        Self {
            board: Vec::with_capacity(rules.board_size),
            rules,
            phase: GamePhase::Idle,
            hit_target: 0,
            score: 0,
            hits: 0,
            misses: 0,
            clock: Countdown::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn activate(&mut self) {
        if self.phase != GamePhase::Idle {
            return;
        }
        self.redraw();
        self.clock.arm(Duration::from_secs(self.rules.duration_secs as u64));
        self.phase = GamePhase::Playing;
    }

    pub fn tap(&mut self, digit: u8) -> Result<InputEffect, MoveError> {
        if self.phase != GamePhase::Playing {
            return Err(MoveError::NotAccepting(self.phase));
        }
        if digit > 9 {
            return Err(MoveError::InvalidDigit(digit));
        }

        if digit == self.hit_target {
            self.score += self.rules.points_per_hit;
            self.hits += 1;
            self.redraw();
            Ok(InputEffect::Hit)
        } else {
            self.score = self.score.saturating_sub(self.rules.penalty_per_miss);
            self.misses += 1;
            Ok(InputEffect::Miss)
        }
    }

    pub fn tick(&mut self, elapsed: Duration) {
        if self.phase == GamePhase::Playing && self.clock.advance(elapsed) {
            self.phase = GamePhase::Completed;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == GamePhase::Completed
    }

    pub fn hit_target(&self) -> u8 {
        self.hit_target
    }

    pub fn board(&self) -> &[u8] {
        &self.board
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn progress(&self) -> ReflexProgress {
        ReflexProgress {
            phase: self.phase,
            score: self.score,
            hits: self.hits,
            misses: self.misses,
            hit_target: self.hit_target,
            board: self.board.clone(),
            time_remaining_secs: self.clock.remaining_secs_ceil(),
        }
    }

    /// `score / max_possible_score`, capped at one by the calculator.
    pub fn performance(&self) -> PerformanceRatio {
        PerformanceRatio::new(self.score, self.rules.max_possible_score())
    }

    pub fn rules(&self) -> &ReflexRules {
        &self.rules
    }

    fn redraw(&mut self) {
        let size = self.rules.board_size;
        let rng = &mut self.rng;
        self.board.clear();
        self.board.extend((0..size).map(|_| rng.gen_range(0..10u8)));
        self.hit_target = self.rng.gen_range(0..10u8);
    }
}
