//! Game rule modules
//!
//! Each variant is a self-contained rule engine that knows nothing about
//! stakes or sessions. The session layer drives them through [`GameRules`]
//! and dispatches over the [`Game`] enum.

pub mod matching;
pub mod prng;
pub mod recall;
pub mod reflex;
pub mod timer;
pub mod types;

pub use matching::{Card, MatchingGame};
pub use recall::RecallGame;
pub use reflex::ReflexGame;
pub use types::*;

use crate::amount::{Multiplier, PerformanceRatio};
use std::time::Duration;

/// Capability set shared by every game variant.
pub trait GameRules {
    /// Starts play; a no-op if already started.
    fn activate(&mut self);

    fn handle_input(&mut self, input: GameInput) -> Result<InputEffect, MoveError>;

    /// Advances armed timers by `elapsed`.
    fn tick(&mut self, elapsed: Duration);

    fn is_complete(&self) -> bool;

    fn progress(&self) -> GameProgress;

    fn performance(&self) -> PerformanceRatio;

    fn multiplier(&self) -> Multiplier;
}

/// A running game of any variant.
pub enum Game {
    Matching(MatchingGame),
    ReflexTap(ReflexGame),
    SequentialRecall(RecallGame),
}

impl Game {
    /// Builds the rule module for `rules`. `seed` drives every random draw
    /// the module makes.
    pub fn new(rules: &VariantRules, seed: u64) -> Self {
        match rules {
            VariantRules::Matching(r) => Game::Matching(MatchingGame::new(r.clone(), seed)),
            VariantRules::ReflexTap(r) => Game::ReflexTap(ReflexGame::new(r.clone(), seed)),
            VariantRules::SequentialRecall(r) => {
                Game::SequentialRecall(RecallGame::new(r.clone(), seed))
            }
        }
    }

    pub fn variant(&self) -> GameVariant {
        match self {
            Game::Matching(_) => GameVariant::Matching,
            Game::ReflexTap(_) => GameVariant::ReflexTap,
            Game::SequentialRecall(_) => GameVariant::SequentialRecall,
        }
    }
}

impl GameRules for Game {
    fn activate(&mut self) {
        match self {
            Game::Matching(g) => g.activate(),
            Game::ReflexTap(g) => g.activate(),
            Game::SequentialRecall(g) => g.activate(),
        }
    }

    fn handle_input(&mut self, input: GameInput) -> Result<InputEffect, MoveError> {
        match (self, input) {
            (Game::Matching(g), GameInput::Flip(index)) => g.flip(index),
            (Game::ReflexTap(g), GameInput::Tap(digit)) => g.tap(digit),
            (Game::SequentialRecall(g), GameInput::Signal(signal)) => g.press(signal),
            (game, input) => Err(MoveError::WrongInputKind {
                variant: game.variant(),
                input,
            }),
        }
    }

    fn tick(&mut self, elapsed: Duration) {
        match self {
            Game::Matching(g) => g.tick(elapsed),
            Game::ReflexTap(g) => g.tick(elapsed),
            Game::SequentialRecall(g) => g.tick(elapsed),
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            Game::Matching(g) => g.is_complete(),
            Game::ReflexTap(g) => g.is_complete(),
            Game::SequentialRecall(g) => g.is_complete(),
        }
    }

    fn progress(&self) -> GameProgress {
        match self {
            Game::Matching(g) => GameProgress::Matching(g.progress()),
            Game::ReflexTap(g) => GameProgress::ReflexTap(g.progress()),
            Game::SequentialRecall(g) => GameProgress::SequentialRecall(g.progress()),
        }
    }

    fn performance(&self) -> PerformanceRatio {
        match self {
            Game::Matching(g) => g.performance(),
            Game::ReflexTap(g) => g.performance(),
            Game::SequentialRecall(g) => g.performance(),
        }
    }

    fn multiplier(&self) -> Multiplier {
        match self {
            Game::Matching(g) => g.rules().multiplier,
            Game::ReflexTap(g) => g.rules().multiplier,
            Game::SequentialRecall(g) => g.rules().multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflex_rules() -> VariantRules {
        VariantRules::ReflexTap(ReflexRules {
            duration_secs: 15,
            multiplier: "2".parse().unwrap(),
            points_per_hit: 10,
            penalty_per_miss: 5,
            max_score_per_second: 6,
            board_size: 48,
        })
    }

    #[test]
    fn test_wrong_input_kind_is_rejected() {
        let mut game = Game::new(&reflex_rules(), 1);
        game.activate();
        let err = game.handle_input(GameInput::Flip(0)).unwrap_err();
        assert_eq!(
            err,
            MoveError::WrongInputKind {
                variant: GameVariant::ReflexTap,
                input: GameInput::Flip(0)
            }
        );
        assert_eq!(game.progress().milestone(), 0);
    }

    #[test]
    fn test_dispatch_reaches_variant() {
        let mut game = Game::new(&reflex_rules(), 1);
        game.activate();
        let target = match game.progress() {
            GameProgress::ReflexTap(p) => p.hit_target,
            other => panic!("unexpected progress {:?}", other),
        };
        assert_eq!(game.handle_input(GameInput::Tap(target)), Ok(InputEffect::Hit));
        assert_eq!(game.multiplier(), "2".parse().unwrap());
        game.tick(Duration::from_secs(15));
        assert!(game.is_complete());
    }
}
