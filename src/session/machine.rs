//! Session state machine
//!
//! Owns the current [`GameSession`] and the rule module driving it. Every
//! status change goes through here; the async service only feeds in gateway
//! outcomes. Callbacks carry the session id they were issued for, and timer
//! ticks carry a [`TickToken`], so late arrivals from an earlier phase are
//! rejected or dropped instead of mutating the wrong session.

use super::types::{GameSession, SessionEvent, SessionId, SessionStatus, TickToken};
use crate::amount::Amount;
use crate::errors::SessionError;
use crate::fairness::commit_seed;
use crate::games::{
    Game, GameInput, GameProgress, GameRules, InputEffect, RecallFailure, VariantConfig,
    VariantRules,
};
use crate::gateway::{PlayerIdentity, TxKind, TxReceipt};
use crate::reward::RewardCalculator;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SessionMachine {
    identity: Option<PlayerIdentity>,
    min_stake: Amount,
    session: Option<GameSession>,
    game: Option<Game>,
    /// Seed of the running game, kept off the session until it ends
    seed: Option<u64>,
    generation: u64,
    deposit_stalled: bool,
    withdraw_in_flight: bool,
    /// Session dropped by `reset` while its deposit was still unconfirmed
    abandoned: Option<GameSession>,
    events: Vec<SessionEvent>,
}

impl SessionMachine {
    pub fn new(min_stake: Amount) -> Self {
        Self {
            identity: None,
            min_stake,
            session: None,
            game: None,
            seed: None,
            generation: 0,
            deposit_stalled: false,
            withdraw_in_flight: false,
            abandoned: None,
            events: Vec::new(),
        }
    }

    pub fn bind_identity(&mut self, identity: PlayerIdentity) {
        info!(%identity, "wallet identity bound");
        self.identity = Some(identity);
    }

    pub fn unbind_identity(&mut self) {
        self.identity = None;
    }

    pub fn identity(&self) -> Option<&PlayerIdentity> {
        self.identity.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Events produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Preconditions of `start_session` that need no gateway round-trip.
    pub fn check_start(&self, stake: Amount) -> Result<PlayerIdentity, SessionError> {
        if !stake.is_positive() {
            return Err(SessionError::InvalidStake {
                stake,
                reason: "stake must be positive".to_string(),
            });
        }
        if stake < self.min_stake {
            return Err(SessionError::InvalidStake {
                stake,
                reason: format!("minimum stake is {}", self.min_stake),
            });
        }
        let identity = self
            .identity
            .clone()
            .ok_or(SessionError::WalletNotConnected)?;
        match self.status() {
            SessionStatus::Idle | SessionStatus::Failed => Ok(identity),
            status => Err(SessionError::SessionBusy(status)),
        }
    }

    /// Creates a session waiting on its deposit.
    pub fn begin_deposit(
        &mut self,
        stake: Amount,
        config: VariantConfig,
        rules: VariantRules,
    ) -> Result<SessionId, SessionError> {
        let identity = self.check_start(stake)?;
        if let Some(receipt) = self.abandoned_deposit() {
            return Err(SessionError::DepositStillPending {
                tx_hash: receipt.tx_hash,
            });
        }
        // rejects stakes whose payout would overflow before any funds move
        RewardCalculator::max_reward(stake, rules.multiplier())?;

        let session = GameSession::new(identity, stake, config, rules);
        let id = session.id;
        let from = self.status();
        info!(session_id = %id, %stake, variant = %session.variant, "deposit requested");

        self.session = Some(session);
        self.game = None;
        self.seed = None;
        self.deposit_stalled = false;
        self.withdraw_in_flight = false;
        self.generation += 1;
        self.events.push(SessionEvent::StatusChanged {
            session_id: id,
            from,
            to: SessionStatus::AwaitingDeposit,
        });
        Ok(id)
    }

    pub fn deposit_submitted(&mut self, id: SessionId, receipt: TxReceipt) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingDeposit, "record deposit")?;
        debug!(session_id = %id, tx_hash = %receipt.tx_hash, "deposit submitted");
        session.deposit = Some(receipt);
        Ok(())
    }

    /// Deposit awaiting confirmation, if any.
    pub fn pending_deposit(&self) -> Option<(SessionId, TxReceipt)> {
        let session = self.session.as_ref()?;
        if session.status != SessionStatus::AwaitingDeposit {
            return None;
        }
        session.deposit.clone().map(|receipt| (session.id, receipt))
    }

    /// Deposit landed: builds the rule module from `seed` and starts play.
    /// Only a commitment to the seed is published until the game ends.
    pub fn deposit_confirmed(&mut self, id: SessionId, seed: u64) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingDeposit, "confirm deposit")?;
        let mut game = Game::new(&session.rules, seed);
        game.activate();
        let progress = game.progress();

        session.seed_commitment = Some(commit_seed(&id, seed));
        session.started_at = Some(Utc::now());
        session.progress = Some(progress.clone());
        self.game = Some(game);
        self.seed = Some(seed);
        self.deposit_stalled = false;
        self.set_status(SessionStatus::Active);
        self.events.push(SessionEvent::Progress {
            session_id: id,
            progress,
        });
        Ok(())
    }

    /// Deposit refused or reverted. Nothing left the player's wallet.
    pub fn deposit_failed(&mut self, id: SessionId, reason: String) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingDeposit, "fail deposit")?;
        warn!(session_id = %id, %reason, "deposit failed");
        session.failure_reason = Some(reason);
        session.ended_at = Some(Utc::now());
        self.deposit_stalled = false;
        self.set_status(SessionStatus::Failed);
        Ok(())
    }

    /// Deposit still pending after the confirmation timeout.
    pub fn deposit_stalled(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingDeposit, "stall deposit")?;
        if let Some(tx_hash) = session.deposit.as_ref().map(|r| r.tx_hash.clone()) {
            warn!(session_id = %id, %tx_hash, "deposit confirmation delayed");
            self.events.push(SessionEvent::ConfirmationDelayed {
                session_id: id,
                kind: TxKind::Deposit,
                tx_hash,
            });
        }
        self.deposit_stalled = true;
        Ok(())
    }

    pub fn handle_input(&mut self, input: GameInput) -> Result<InputEffect, SessionError> {
        let status = self.status();
        let game = match (status, self.game.as_mut()) {
            (SessionStatus::Active, Some(game)) => game,
            _ => {
                return Err(SessionError::InvalidTransition {
                    action: "play",
                    status,
                })
            }
        };
        let effect = game.handle_input(input)?;
        self.after_game_step()?;
        Ok(effect)
    }

    /// Token for the ticker of the current active phase.
    pub fn tick_token(&self) -> Option<TickToken> {
        let session = self.session.as_ref()?;
        (session.status == SessionStatus::Active).then_some(TickToken {
            session_id: session.id,
            generation: self.generation,
        })
    }

    /// Advances game timers. Returns `false` when the token is stale and
    /// the tick was dropped.
    pub fn tick(&mut self, token: &TickToken, elapsed: Duration) -> Result<bool, SessionError> {
        if self.tick_token().as_ref() != Some(token) {
            debug!(
                session_id = %token.session_id,
                generation = token.generation,
                "stale tick dropped"
            );
            return Ok(false);
        }
        if let Some(game) = self.game.as_mut() {
            game.tick(elapsed);
        }
        self.after_game_step()?;
        Ok(true)
    }

    /// Claims the payout for the current session and marks it in flight.
    pub fn begin_withdraw(&mut self) -> Result<(SessionId, PlayerIdentity, Amount), SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NothingToWithdraw)?;
        if self.withdraw_in_flight {
            return Err(SessionError::WithdrawInFlight {
                tx_hash: session.withdraw.as_ref().map(|r| r.tx_hash.clone()),
            });
        }
        match session.status {
            SessionStatus::AwaitingSettlement => {}
            SessionStatus::Completed => return Err(SessionError::NothingToWithdraw),
            status => {
                return Err(SessionError::InvalidTransition {
                    action: "withdraw",
                    status,
                })
            }
        }
        let amount = match &session.settlement {
            Some(result) if result.is_payable() => result.earned_amount,
            _ => return Err(SessionError::NothingToWithdraw),
        };

        info!(session_id = %session.id, %amount, "withdraw requested");
        self.withdraw_in_flight = true;
        Ok((session.id, session.identity.clone(), amount))
    }

    pub fn withdraw_submitted(&mut self, id: SessionId, receipt: TxReceipt) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingSettlement, "record withdraw")?;
        debug!(session_id = %id, tx_hash = %receipt.tx_hash, "withdraw submitted");
        session.withdraw = Some(receipt);
        Ok(())
    }

    /// Withdraw awaiting confirmation, if any.
    pub fn pending_withdraw(&self) -> Option<(SessionId, TxReceipt)> {
        if !self.withdraw_in_flight {
            return None;
        }
        let session = self.session.as_ref()?;
        session.withdraw.clone().map(|receipt| (session.id, receipt))
    }

    pub fn withdraw_confirmed(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingSettlement, "confirm withdraw")?;
        let (amount, tx_hash) = match &session.withdraw {
            Some(receipt) => (receipt.amount, receipt.tx_hash.clone()),
            None => {
                return Err(SessionError::InvalidTransition {
                    action: "confirm withdraw",
                    status: SessionStatus::AwaitingSettlement,
                })
            }
        };
        self.withdraw_in_flight = false;
        info!(session_id = %id, %amount, %tx_hash, "payout confirmed");
        self.events.push(SessionEvent::Withdrawn {
            session_id: id,
            amount,
            tx_hash,
        });
        self.set_status(SessionStatus::Completed);
        Ok(())
    }

    /// Withdraw refused or reverted. The reward stays claimable.
    pub fn withdraw_failed(&mut self, id: SessionId, reason: &str) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingSettlement, "fail withdraw")?;
        warn!(session_id = %id, %reason, "withdraw failed, reward still claimable");
        session.withdraw = None;
        self.withdraw_in_flight = false;
        Ok(())
    }

    /// Withdraw still pending after the confirmation timeout. It stays in
    /// flight so a second withdraw cannot be issued.
    pub fn withdraw_stalled(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self.expect_status(id, SessionStatus::AwaitingSettlement, "stall withdraw")?;
        if let Some(tx_hash) = session.withdraw.as_ref().map(|r| r.tx_hash.clone()) {
            warn!(session_id = %id, %tx_hash, "withdraw confirmation delayed");
            self.events.push(SessionEvent::ConfirmationDelayed {
                session_id: id,
                kind: TxKind::Withdraw,
                tx_hash,
            });
        }
        Ok(())
    }

    /// Returns to `Idle`, discarding the session and its settlement.
    ///
    /// Allowed from `Completed` and `Failed`, and from `AwaitingDeposit`
    /// once the deposit confirmation has timed out. In the last case the
    /// deposit is remembered and reconciled before the next session starts.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        let status = self.status();
        match status {
            SessionStatus::Idle => return Ok(()),
            SessionStatus::Completed | SessionStatus::Failed => {}
            SessionStatus::AwaitingDeposit if self.deposit_stalled => {
                if let Some(session) = self.session.clone() {
                    warn!(session_id = %session.id, "session abandoned with unconfirmed deposit");
                    self.abandoned = Some(session);
                }
            }
            status => {
                return Err(SessionError::InvalidTransition {
                    action: "reset",
                    status,
                })
            }
        }

        if let Some(session) = self.session.take() {
            info!(session_id = %session.id, from = %status, "session reset");
            self.events.push(SessionEvent::StatusChanged {
                session_id: session.id,
                from: status,
                to: SessionStatus::Idle,
            });
        }
        self.game = None;
        self.seed = None;
        self.deposit_stalled = false;
        self.withdraw_in_flight = false;
        self.generation += 1;
        Ok(())
    }

    /// Deposit of an abandoned session that has not been reconciled yet.
    pub fn abandoned_deposit(&self) -> Option<TxReceipt> {
        self.abandoned.as_ref().and_then(|s| s.deposit.clone())
    }

    /// Forgets an abandoned deposit and returns its receipt, if one was held.
    pub fn discard_abandoned(&mut self) -> Option<TxReceipt> {
        let session = self.abandoned.take()?;
        info!(session_id = %session.id, "abandoned deposit discarded");
        session.deposit
    }

    /// An abandoned deposit landed after all: puts its session back and
    /// starts play as if the confirmation had arrived in time.
    pub fn recover_abandoned(&mut self, seed: u64) -> Result<SessionId, SessionError> {
        match self.status() {
            SessionStatus::Idle | SessionStatus::Failed => {}
            status => return Err(SessionError::SessionBusy(status)),
        }
        let mut session = self.abandoned.take().ok_or(SessionError::InvalidTransition {
            action: "recover deposit",
            status: self.status(),
        })?;
        let id = session.id;
        let from = self.status();
        session.status = SessionStatus::AwaitingDeposit;
        info!(session_id = %id, "abandoned deposit confirmed, resuming session");

        self.session = Some(session);
        self.game = None;
        self.generation += 1;
        self.events.push(SessionEvent::StatusChanged {
            session_id: id,
            from,
            to: SessionStatus::AwaitingDeposit,
        });
        self.deposit_confirmed(id, seed)?;
        Ok(id)
    }

    fn expect_status(
        &mut self,
        id: SessionId,
        expected: SessionStatus,
        action: &'static str,
    ) -> Result<&mut GameSession, SessionError> {
        let session = match self.session.as_mut() {
            Some(session) if session.id == id => session,
            _ => return Err(SessionError::UnknownSession(id)),
        };
        if session.status != expected {
            return Err(SessionError::InvalidTransition {
                action,
                status: session.status,
            });
        }
        Ok(session)
    }

    fn set_status(&mut self, to: SessionStatus) {
        if let Some(session) = self.session.as_mut() {
            let from = session.status;
            session.status = to;
            self.generation += 1;
            info!(session_id = %session.id, %from, %to, "session status changed");
            self.events.push(SessionEvent::StatusChanged {
                session_id: session.id,
                from,
                to,
            });
        }
    }

    /// Publishes changed progress and settles once the rule module is done.
    fn after_game_step(&mut self) -> Result<(), SessionError> {
        let (session, game) = match (self.session.as_mut(), self.game.as_ref()) {
            (Some(session), Some(game)) => (session, game),
            _ => return Ok(()),
        };
        let progress = game.progress();
        if session.progress.as_ref() != Some(&progress) {
            session.progress = Some(progress.clone());
            self.events.push(SessionEvent::Progress {
                session_id: session.id,
                progress,
            });
        }
        if game.is_complete() {
            self.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SessionError> {
        let (session, game) = match (self.session.as_mut(), self.game.as_ref()) {
            (Some(session), Some(game)) => (session, game),
            _ => return Ok(()),
        };
        let result = RewardCalculator::settle(session.stake, game.multiplier(), game.performance())?;
        info!(
            session_id = %session.id,
            earned = %result.earned_amount,
            net_gain = %result.net_gain,
            "session settled"
        );

        session.ended_at = Some(Utc::now());
        session.seed = self.seed;
        if let Some(GameProgress::SequentialRecall(progress)) = &session.progress {
            session.failure_reason = progress.failure.map(describe_recall_failure);
        }
        session.settlement = Some(result.clone());
        self.events.push(SessionEvent::SettlementComputed {
            session_id: session.id,
            result: result.clone(),
        });

        let next = if result.is_payable() {
            SessionStatus::AwaitingSettlement
        } else {
            SessionStatus::Completed
        };
        self.set_status(next);
        Ok(())
    }
}

fn describe_recall_failure(failure: RecallFailure) -> String {
    match failure {
        RecallFailure::WrongSymbol { expected, got } => {
            format!("wrong symbol: expected {}, got {}", expected, got)
        }
        RecallFailure::Timeout => "input window expired".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::{GridSize, MatchingGame, MatchingRules, MoveError};
    use crate::gateway::{TxHash, TxKind};

    const SEED: u64 = 7;

    fn matching_rules() -> MatchingRules {
        MatchingRules {
            grid_size: GridSize::Two,
            total_pairs: 2,
            max_flips: 3,
            multiplier: "1.2".parse().unwrap(),
            mismatch_hide: Duration::from_millis(1000),
        }
    }

    fn config() -> VariantConfig {
        VariantConfig::Matching {
            grid_size: GridSize::Two,
        }
    }

    fn receipt(kind: TxKind, amount: Amount) -> TxReceipt {
        TxReceipt {
            tx_hash: TxHash(format!("0x{}", kind)),
            kind,
            identity: PlayerIdentity::new("0xplayer"),
            amount,
            submitted_at: Utc::now(),
        }
    }

    fn machine() -> SessionMachine {
        let mut machine = SessionMachine::new("0.0001".parse().unwrap());
        machine.bind_identity(PlayerIdentity::new("0xplayer"));
        machine
    }

    fn active(machine: &mut SessionMachine, stake: i64) -> SessionId {
        let stake = Amount::from_whole(stake);
        let id = machine
            .begin_deposit(stake, config(), VariantRules::Matching(matching_rules()))
            .unwrap();
        machine
            .deposit_submitted(id, receipt(TxKind::Deposit, stake))
            .unwrap();
        machine.deposit_confirmed(id, SEED).unwrap();
        id
    }

    /// Indices of the two cards of each symbol on the board dealt by `SEED`.
    fn pairs() -> Vec<(usize, usize)> {
        let mut game = MatchingGame::new(matching_rules(), SEED);
        game.activate();
        let cards = game.cards();
        (0..2u32)
            .map(|symbol| {
                let mut idx = cards.iter().enumerate().filter(|(_, c)| c.symbol_id == symbol);
                (idx.next().unwrap().0, idx.next().unwrap().0)
            })
            .collect()
    }

    #[test]
    fn test_start_preconditions() {
        let mut unbound = SessionMachine::new(Amount::from_units(100));
        let err = unbound
            .begin_deposit(Amount::from_whole(1), config(), VariantRules::Matching(matching_rules()))
            .unwrap_err();
        assert_eq!(err, SessionError::WalletNotConnected);

        let mut m = machine();
        for stake in [Amount::ZERO, Amount::from_whole(-1), Amount::from_units(99)] {
            assert!(matches!(
                m.check_start(stake),
                Err(SessionError::InvalidStake { .. })
            ));
        }
        assert_eq!(m.status(), SessionStatus::Idle);
        assert!(m.drain_events().is_empty());
    }

    #[test]
    fn test_single_session_at_a_time() {
        let mut m = machine();
        active(&mut m, 1);
        let err = m
            .begin_deposit(Amount::from_whole(1), config(), VariantRules::Matching(matching_rules()))
            .unwrap_err();
        assert_eq!(err, SessionError::SessionBusy(SessionStatus::Active));
    }

    #[test]
    fn test_input_blocked_while_awaiting_deposit() {
        let mut m = machine();
        m.begin_deposit(Amount::from_whole(1), config(), VariantRules::Matching(matching_rules()))
            .unwrap();
        let err = m.handle_input(GameInput::Flip(0)).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                action: "play",
                status: SessionStatus::AwaitingDeposit
            }
        );
    }

    #[test]
    fn test_full_clear_settles_at_max_reward() {
        let mut m = machine();
        let id = active(&mut m, 5);
        for (a, b) in pairs() {
            m.handle_input(GameInput::Flip(a)).unwrap();
            assert_eq!(m.handle_input(GameInput::Flip(b)).unwrap(), InputEffect::PairMatched);
        }
        assert_eq!(m.status(), SessionStatus::AwaitingSettlement);
        let settlement = m.session().unwrap().settlement.clone().unwrap();
        assert_eq!(settlement.earned_amount, Amount::from_whole(6));
        assert_eq!(settlement.net_gain, Amount::from_whole(1));

        let (withdraw_id, _, amount) = m.begin_withdraw().unwrap();
        assert_eq!(withdraw_id, id);
        assert_eq!(amount, Amount::from_whole(6));
        assert!(matches!(
            m.begin_withdraw(),
            Err(SessionError::WithdrawInFlight { .. })
        ));
        m.withdraw_submitted(id, receipt(TxKind::Withdraw, amount)).unwrap();
        m.withdraw_confirmed(id).unwrap();
        assert_eq!(m.status(), SessionStatus::Completed);
        assert_eq!(m.begin_withdraw(), Err(SessionError::NothingToWithdraw));

        m.reset().unwrap();
        assert_eq!(m.status(), SessionStatus::Idle);
        assert!(m.session().is_none());
    }

    #[test]
    fn test_seed_hidden_until_game_ends() {
        let mut m = machine();
        let id = active(&mut m, 1);
        let session = m.session().unwrap();
        assert!(session.seed.is_none());
        let commitment = session.seed_commitment.clone().unwrap();
        let json = serde_json::to_string(session).unwrap();
        assert!(!json.contains(&format!("\"seed\":{}", SEED)));

        for (a, b) in pairs() {
            m.handle_input(GameInput::Flip(a)).unwrap();
            m.handle_input(GameInput::Flip(b)).unwrap();
        }
        let session = m.session().unwrap();
        assert_eq!(session.seed, Some(SEED));
        assert!(crate::fairness::verify_seed(&id, SEED, &commitment));
    }

    #[test]
    fn test_zero_reward_skips_settlement() {
        let mut m = machine();
        active(&mut m, 5);
        let pairs = pairs();
        let (a, c) = (pairs[0].0, pairs[1].0);
        for _ in 0..3 {
            m.handle_input(GameInput::Flip(a)).unwrap();
            m.handle_input(GameInput::Flip(c)).unwrap();
            if let Some(token) = m.tick_token() {
                m.tick(&token, Duration::from_millis(1000)).unwrap();
            }
        }
        assert_eq!(m.status(), SessionStatus::Completed);
        let settlement = m.session().unwrap().settlement.clone().unwrap();
        assert_eq!(settlement.earned_amount, Amount::ZERO);
        assert_eq!(settlement.net_gain, Amount::from_whole(-5));
        assert_eq!(m.begin_withdraw(), Err(SessionError::NothingToWithdraw));
    }

    #[test]
    fn test_stale_tick_is_dropped() {
        let mut m = machine();
        active(&mut m, 1);
        let token = m.tick_token().unwrap();
        let pairs = pairs();
        m.handle_input(GameInput::Flip(pairs[0].0)).unwrap();
        m.handle_input(GameInput::Flip(pairs[1].0)).unwrap();
        assert!(m.tick(&token, Duration::from_millis(1000)).unwrap());

        for (a, b) in pairs {
            m.handle_input(GameInput::Flip(a)).unwrap();
            m.handle_input(GameInput::Flip(b)).unwrap();
        }
        assert_eq!(m.status(), SessionStatus::AwaitingSettlement);
        let frozen = m.session().unwrap().progress.clone();
        assert!(!m.tick(&token, Duration::from_secs(5)).unwrap());
        assert_eq!(m.session().unwrap().progress, frozen);
        assert!(m.tick_token().is_none());
    }

    #[test]
    fn test_invalid_move_leaves_session_untouched() {
        let mut m = machine();
        active(&mut m, 1);
        let err = m.handle_input(GameInput::Flip(99)).unwrap_err();
        assert_eq!(err, SessionError::InvalidMove(MoveError::CardOutOfRange(99)));
        assert_eq!(m.status(), SessionStatus::Active);
    }

    #[test]
    fn test_deposit_failure_allows_restart() {
        let mut m = machine();
        let id = m
            .begin_deposit(Amount::from_whole(1), config(), VariantRules::Matching(matching_rules()))
            .unwrap();
        m.deposit_failed(id, "user rejected".to_string()).unwrap();
        assert_eq!(m.status(), SessionStatus::Failed);
        assert_eq!(
            m.session().unwrap().failure_reason.as_deref(),
            Some("user rejected")
        );

        let next = m
            .begin_deposit(Amount::from_whole(1), config(), VariantRules::Matching(matching_rules()))
            .unwrap();
        assert_ne!(next, id);
        assert_eq!(
            m.deposit_confirmed(id, SEED),
            Err(SessionError::UnknownSession(id))
        );
    }

    #[test]
    fn test_withdraw_failure_is_retryable() {
        let mut m = machine();
        let id = active(&mut m, 5);
        for (a, b) in pairs() {
            m.handle_input(GameInput::Flip(a)).unwrap();
            m.handle_input(GameInput::Flip(b)).unwrap();
        }
        m.begin_withdraw().unwrap();
        m.withdraw_failed(id, "reverted").unwrap();
        assert_eq!(m.status(), SessionStatus::AwaitingSettlement);
        assert!(m.pending_withdraw().is_none());
        assert!(m.begin_withdraw().is_ok());
        assert!(matches!(
            m.reset(),
            Err(SessionError::InvalidTransition { action: "reset", .. })
        ));
    }

    #[test]
    fn test_abandoned_deposit_is_reconciled() {
        let mut m = machine();
        let stake = Amount::from_whole(2);
        let id = m
            .begin_deposit(stake, config(), VariantRules::Matching(matching_rules()))
            .unwrap();
        assert!(m.reset().is_err());

        m.deposit_submitted(id, receipt(TxKind::Deposit, stake)).unwrap();
        m.deposit_stalled(id).unwrap();
        m.reset().unwrap();
        assert_eq!(m.status(), SessionStatus::Idle);
        assert!(m.abandoned_deposit().is_some());

        let err = m
            .begin_deposit(stake, config(), VariantRules::Matching(matching_rules()))
            .unwrap_err();
        assert!(matches!(err, SessionError::DepositStillPending { .. }));

        let recovered = m.recover_abandoned(SEED).unwrap();
        assert_eq!(recovered, id);
        assert_eq!(m.status(), SessionStatus::Active);
        assert_eq!(m.session().unwrap().stake, stake);
        assert!(m.abandoned_deposit().is_none());
    }

    #[test]
    fn test_events_follow_transitions() {
        let mut m = machine();
        let id = active(&mut m, 1);
        let events = m.drain_events();
        let statuses: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StatusChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![SessionStatus::AwaitingDeposit, SessionStatus::Active]
        );
        assert!(events.iter().all(|e| e.session_id() == id));
        assert!(m.drain_events().is_empty());
    }
}
