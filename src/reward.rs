//! Reward calculation shared by every game variant.
//!
//! `reward = stake × multiplier × clamp(performance, 0, 1)`, evaluated in
//! integer base units.

use crate::amount::{Amount, Multiplier, PerformanceRatio, BPS_SCALE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    #[error("stake must be positive, got {0}")]
    NonPositiveStake(Amount),

    #[error("reward for stake {stake} at {multiplier}x overflows")]
    Overflow { stake: Amount, multiplier: Multiplier },
}

/// Outcome of a finished session, computed once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub stake: Amount,
    pub multiplier: Multiplier,
    pub performance: PerformanceRatio,
    pub earned_amount: Amount,
    pub net_gain: Amount,
}

impl SettlementResult {
    /// True when there is something to pay out.
    pub fn is_payable(&self) -> bool {
        self.earned_amount.is_positive()
    }
}

/// Stateless reward formula.
pub struct RewardCalculator;

impl RewardCalculator {
    /// Payout for `stake` at `multiplier` and the given performance.
    ///
    /// Truncates to base units, except that a non-zero performance never
    /// rounds down to a zero reward.
    pub fn reward(
        stake: Amount,
        multiplier: Multiplier,
        performance: PerformanceRatio,
    ) -> Result<Amount, RewardError> {
        if !stake.is_positive() {
            return Err(RewardError::NonPositiveStake(stake));
        }
        let (achieved, target) = performance.clamped();
        if achieved == 0 {
            return Ok(Amount::ZERO);
        }

        let numerator = multiplier.bps() as u128 * achieved as u128;
        let denominator = BPS_SCALE as u128 * target as u128;
        let earned = stake
            .checked_mul_div(numerator, denominator)
            .ok_or(RewardError::Overflow { stake, multiplier })?;

        if earned.is_zero() && multiplier.bps() > 0 {
            return Ok(Amount::from_units(1));
        }
        Ok(earned)
    }

    /// Upper bound of [`RewardCalculator::reward`]: `stake × multiplier`.
    pub fn max_reward(stake: Amount, multiplier: Multiplier) -> Result<Amount, RewardError> {
        Self::reward(stake, multiplier, PerformanceRatio::FULL)
    }

    pub fn settle(
        stake: Amount,
        multiplier: Multiplier,
        performance: PerformanceRatio,
    ) -> Result<SettlementResult, RewardError> {
        let earned_amount = Self::reward(stake, multiplier, performance)?;
        Ok(SettlementResult {
            stake,
            multiplier,
            performance,
            earned_amount,
            net_gain: earned_amount - stake,
        })
    }
}
