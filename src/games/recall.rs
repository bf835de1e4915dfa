//! Sequential-recall rules.
//!
//! Each round shows one new symbol, then the player must replay the whole
//! prefix before a single round timer runs out. The first wrong symbol or
//! timeout ends the run; the score is the number of rounds cleared.

use super::prng;
use super::timer::Countdown;
use super::types::{GamePhase, InputEffect, MoveError, RecallFailure, RecallProgress, RecallRules};
use crate::amount::PerformanceRatio;
use std::time::Duration;
use tracing::debug;

pub struct RecallGame {
    rules: RecallRules,
    sequence: Vec<u32>,
    phase: GamePhase,
    level: u32,
    input_index: usize,
    timer: Countdown,
    failure: Option<RecallFailure>,
}

impl RecallGame {
    pub fn new(rules: RecallRules, seed: u64) -> Self {
        let sequence = prng::generate(seed, rules.sequence_length, rules.symbols);
        Self {
            rules,
            sequence,
            phase: GamePhase::Idle,
            level: 0,
            input_index: 0,
            timer: Countdown::new(),
            failure: None,
        }
    }

    pub fn activate(&mut self) {
        if self.phase != GamePhase::Idle {
            return;
        }
        self.enter_showing();
    }

    pub fn press(&mut self, signal: u32) -> Result<InputEffect, MoveError> {
        if self.phase != GamePhase::Input {
            return Err(MoveError::NotAccepting(self.phase));
        }
        if signal >= self.rules.symbols {
            return Err(MoveError::InvalidSignal {
                signal,
                max: self.rules.symbols.saturating_sub(1),
            });
        }

        let expected = self.sequence[self.input_index];
        if signal != expected {
            self.fail(RecallFailure::WrongSymbol {
                expected,
                got: signal,
            });
            return Ok(InputEffect::RoundFailed);
        }

        self.input_index += 1;
        if self.input_index < self.round_length() {
            return Ok(InputEffect::SignalAccepted);
        }

        self.level += 1;
        debug!(level = self.level, "recall round cleared");
        self.enter_showing();
        Ok(InputEffect::RoundCleared)
    }

    pub fn tick(&mut self, elapsed: Duration) {
        match self.phase {
            GamePhase::Showing => {
                if self.timer.advance(elapsed) {
                    self.enter_input();
                }
            }
            GamePhase::Input => {
                if self.timer.advance(elapsed) {
                    self.fail(RecallFailure::Timeout);
                }
            }
            _ => {}
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == GamePhase::Completed
    }

    /// Rounds fully cleared.
    pub fn score(&self) -> u32 {
        self.level
    }

    pub fn failure(&self) -> Option<RecallFailure> {
        self.failure
    }

    /// The newest symbol while it is lit. Earlier symbols are never replayed.
    pub fn showing(&self) -> Option<u32> {
        if self.phase == GamePhase::Showing && self.timer.remaining() > self.rules.reveal_gap {
            self.sequence.get(self.level as usize).copied()
        } else {
            None
        }
    }

    pub fn progress(&self) -> RecallProgress {
        let input_time_remaining_ms = if self.phase == GamePhase::Input {
            self.timer.remaining().as_millis() as u64
        } else {
            0
        };
        RecallProgress {
            phase: self.phase,
            level: self.level,
            current_length: self.round_length() as u32,
            completed_inputs: self.input_index as u32,
            showing: self.showing(),
            input_time_remaining_ms,
            failure: self.failure,
        }
    }

    /// `level / target_level`; clearing more than the target pays no extra.
    pub fn performance(&self) -> PerformanceRatio {
        PerformanceRatio::new(self.level as u64, self.rules.target_level as u64)
    }

    pub fn rules(&self) -> &RecallRules {
        &self.rules
    }

    fn round_length(&self) -> usize {
        self.level as usize + 1
    }

    fn enter_showing(&mut self) {
        if self.level as usize >= self.sequence.len() {
            // every generated symbol recalled
            self.timer.cancel();
            self.phase = GamePhase::Completed;
            return;
        }
        self.input_index = 0;
        self.timer.arm(self.rules.signal_display + self.rules.reveal_gap);
        self.phase = GamePhase::Showing;
    }

    fn enter_input(&mut self) {
        self.input_index = 0;
        self.timer.arm(self.rules.input_window(self.level));
        self.phase = GamePhase::Input;
    }

    fn fail(&mut self, failure: RecallFailure) {
        debug!(level = self.level, ?failure, "recall run ended");
        self.timer.cancel();
        self.failure = Some(failure);
        self.phase = GamePhase::Completed;
    }
}
