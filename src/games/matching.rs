//! Memory-matching rules.
//!
//! Players flip two cards per attempt. Every attempt, matched or not, spends
//! one unit of the flip budget; the run ends when all pairs are found or the
//! budget is gone.

use super::timer::Countdown;
use super::types::{
    CardView, GamePhase, InputEffect, MatchingProgress, MatchingRules, MoveError,
};
use crate::amount::PerformanceRatio;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub symbol_id: u32,
    pub face_up: bool,
    pub matched: bool,
}

impl Card {
    /// What the player may see of this card.
    pub fn view(&self) -> CardView {
        CardView {
            face_up: self.face_up,
            matched: self.matched,
            symbol_id: (self.face_up || self.matched).then_some(self.symbol_id),
        }
    }
}

pub struct MatchingGame {
    rules: MatchingRules,
    cards: Vec<Card>,
    phase: GamePhase,
    /// Face-up, unmatched cards of the current attempt (at most two)
    revealed: Vec<usize>,
    correct_pairs: u32,
    wrong_pairs: u32,
    hide_timer: Countdown,
    rng: StdRng,
}

impl MatchingGame {
    pub fn new(rules: MatchingRules, seed: u64) -> Self {
        let cards = (0..rules.total_pairs)
            .flat_map(|symbol_id| {
                let card = Card {
                    symbol_id,
                    face_up: false,
                    matched: false,
                };
                [card, card]
            })
            .collect();

        Self {
            rules,
            cards,
            phase: GamePhase::Idle,
            revealed: Vec::with_capacity(2),
            correct_pairs: 0,
            wrong_pairs: 0,
            hide_timer: Countdown::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Deals the board and starts accepting flips.
    pub fn activate(&mut self) {
        if self.phase != GamePhase::Idle {
            return;
        }
        self.cards.shuffle(&mut self.rng);
        self.phase = GamePhase::Playing;
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn attempts(&self) -> u32 {
        self.correct_pairs + self.wrong_pairs
    }

    pub fn flip(&mut self, index: usize) -> Result<InputEffect, MoveError> {
        if self.phase != GamePhase::Playing {
            return Err(MoveError::NotAccepting(self.phase));
        }
        if index >= self.cards.len() {
            return Err(MoveError::CardOutOfRange(index));
        }
        if self.hide_timer.is_armed() {
            return Err(MoveError::BoardBusy);
        }
        if self.attempts() >= self.rules.max_flips {
            return Err(MoveError::FlipBudgetExhausted);
        }
        let card = &mut self.cards[index];
        if card.matched || card.face_up {
            return Err(MoveError::CardUnavailable(index));
        }

        card.face_up = true;
        self.revealed.push(index);
        if self.revealed.len() < 2 {
            return Ok(InputEffect::CardRevealed);
        }

        let (first, second) = (self.revealed[0], self.revealed[1]);
        let effect = if self.cards[first].symbol_id == self.cards[second].symbol_id {
            self.cards[first].matched = true;
            self.cards[second].matched = true;
            self.revealed.clear();
            self.correct_pairs += 1;
            InputEffect::PairMatched
        } else {
            self.wrong_pairs += 1;
            self.hide_timer.arm(self.rules.mismatch_hide);
            InputEffect::PairMismatched
        };
        trace!(
            correct = self.correct_pairs,
            wrong = self.wrong_pairs,
            "matching attempt resolved"
        );

        if self.correct_pairs == self.rules.total_pairs || self.attempts() >= self.rules.max_flips {
            self.finish();
        }
        Ok(effect)
    }

    pub fn tick(&mut self, elapsed: Duration) {
        if self.phase == GamePhase::Playing && self.hide_timer.advance(elapsed) {
            self.hide_revealed();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == GamePhase::Completed
    }

    pub fn progress(&self) -> MatchingProgress {
        MatchingProgress {
            phase: self.phase,
            correct_pairs: self.correct_pairs,
            wrong_pairs: self.wrong_pairs,
            total_pairs: self.rules.total_pairs,
            flips_left: self.rules.max_flips.saturating_sub(self.attempts()),
            cards: self.cards.iter().map(Card::view).collect(),
        }
    }

    /// `correct_pairs / total_pairs`, independent of how many flips it took.
    pub fn performance(&self) -> PerformanceRatio {
        PerformanceRatio::new(self.correct_pairs as u64, self.rules.total_pairs as u64)
    }

    pub fn rules(&self) -> &MatchingRules {
        &self.rules
    }

    fn hide_revealed(&mut self) {
        for index in self.revealed.drain(..) {
            self.cards[index].face_up = false;
        }
    }

    fn finish(&mut self) {
        self.hide_timer.cancel();
        self.hide_revealed();
        self.phase = GamePhase::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::GridSize;

    fn rules(grid_size: GridSize, max_flips: u32) -> MatchingRules {
        MatchingRules {
            grid_size,
            total_pairs: grid_size.total_pairs(),
            max_flips,
            multiplier: "1.5".parse().unwrap(),
            mismatch_hide: Duration::from_millis(1000),
        }
    }

    fn pair_positions(game: &MatchingGame) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for symbol in 0..game.rules().total_pairs {
            let idx: Vec<usize> = game
                .cards()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.symbol_id == symbol)
                .map(|(i, _)| i)
                .collect();
            pairs.push((idx[0], idx[1]));
        }
        pairs
    }

    #[test]
    fn test_progress_masks_face_down_cards() {
        let mut game = MatchingGame::new(rules(GridSize::Four, 14), 5);
        game.activate();
        let view = game.progress().cards;
        assert_eq!(view.len(), 16);
        assert!(view.iter().all(|c| c.symbol_id.is_none() && !c.face_up));

        let (a, b) = pair_positions(&game)[3];
        game.flip(a).unwrap();
        let view = game.progress().cards;
        assert_eq!(view[a].symbol_id, Some(3));
        assert_eq!(view.iter().filter(|c| c.symbol_id.is_some()).count(), 1);

        game.flip(b).unwrap();
        let view = game.progress().cards;
        assert!(view[a].matched && view[b].matched);
        assert_eq!(view[b].symbol_id, Some(3));

        let (c, d) = mismatch(&game);
        game.flip(c).unwrap();
        game.flip(d).unwrap();
        game.tick(Duration::from_millis(1000));
        let view = game.progress().cards;
        assert_eq!(view[c].symbol_id, None);
        assert_eq!(view[d].symbol_id, None);
        assert_eq!(view.iter().filter(|c| c.symbol_id.is_some()).count(), 2);
    }

    fn mismatch(game: &MatchingGame) -> (usize, usize) {
        let cards = game.cards();
        let first = cards.iter().position(|c| !c.matched).unwrap();
        let second = cards
            .iter()
            .enumerate()
            .position(|(i, c)| i != first && !c.matched && c.symbol_id != cards[first].symbol_id)
            .unwrap();
        (first, second)
    }

    #[test]
    fn test_flip_before_activation_rejected() {
        let mut game = MatchingGame::new(rules(GridSize::Two, 3), 7);
        assert_eq!(game.flip(0), Err(MoveError::NotAccepting(GamePhase::Idle)));
    }

    #[test]
    fn test_match_all_pairs_completes() {
        let mut game = MatchingGame::new(rules(GridSize::Four, 14), 7);
        game.activate();
        for (a, b) in pair_positions(&game) {
            assert_eq!(game.flip(a), Ok(InputEffect::CardRevealed));
            assert_eq!(game.flip(b), Ok(InputEffect::PairMatched));
        }
        assert!(game.is_complete());
        assert!(game.performance().is_full());
        assert_eq!(game.progress().wrong_pairs, 0);
    }

    #[test]
    fn test_mismatch_hides_after_delay() {
        let mut game = MatchingGame::new(rules(GridSize::Four, 14), 11);
        game.activate();
        let (a, b) = mismatch(&game);
        game.flip(a).unwrap();
        assert_eq!(game.flip(b), Ok(InputEffect::PairMismatched));
        assert!(game.cards()[a].face_up);

        let (c, _) = pair_positions(&game)
            .into_iter()
            .find(|(x, y)| ![a, b].contains(x) && ![a, b].contains(y))
            .unwrap();
        assert_eq!(game.flip(c), Err(MoveError::BoardBusy));

        game.tick(Duration::from_millis(600));
        assert!(game.cards()[b].face_up);
        game.tick(Duration::from_millis(400));
        assert!(!game.cards()[a].face_up);
        assert!(!game.cards()[b].face_up);
        assert_eq!(game.flip(c), Ok(InputEffect::CardRevealed));
    }

    #[test]
    fn test_rejects_face_up_and_matched_cards() {
        let mut game = MatchingGame::new(rules(GridSize::Four, 14), 3);
        game.activate();
        let (a, b) = pair_positions(&game)[0];
        game.flip(a).unwrap();
        assert_eq!(game.flip(a), Err(MoveError::CardUnavailable(a)));
        game.flip(b).unwrap();
        assert_eq!(game.flip(b), Err(MoveError::CardUnavailable(b)));
        assert_eq!(game.flip(99), Err(MoveError::CardOutOfRange(99)));
    }

    #[test]
    fn test_budget_exhaustion_ends_game() {
        let mut game = MatchingGame::new(rules(GridSize::Four, 2), 5);
        game.activate();
        for _ in 0..2 {
            let (a, b) = mismatch(&game);
            game.flip(a).unwrap();
            game.flip(b).unwrap();
            game.tick(Duration::from_secs(1));
        }
        assert!(game.is_complete());
        assert_eq!(game.progress().flips_left, 0);
        assert!(game.cards().iter().all(|c| !c.face_up));
        assert_eq!(game.flip(0), Err(MoveError::NotAccepting(GamePhase::Completed)));
    }

    #[test]
    fn test_counters_stay_within_budget() {
        let mut game = MatchingGame::new(rules(GridSize::Six, 30), 99);
        game.activate();
        let len = game.cards().len();
        for step in 0..500usize {
            let _ = game.flip((step * 7) % len);
            game.tick(Duration::from_millis(250));
            let p = game.progress();
            assert!(p.correct_pairs + p.wrong_pairs <= 30);
            assert!(p.correct_pairs <= p.total_pairs);
        }
    }

    #[test]
    fn test_half_the_pairs_is_half_performance() {
        let mut game = MatchingGame::new(rules(GridSize::Four, 14), 21);
        game.activate();
        for (a, b) in pair_positions(&game).into_iter().take(4) {
            game.flip(a).unwrap();
            game.flip(b).unwrap();
        }
        assert_eq!(game.performance(), PerformanceRatio::new(4, 8));
    }
}
