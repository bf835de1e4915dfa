//! Async session coordinator
//!
//! Wraps the [`SessionMachine`] behind a tokio mutex and performs the gateway
//! round-trips (deposit, confirmation polling, withdraw) without holding the
//! lock, so the machine stays responsive while a transaction is in flight.
//! Every batch of machine events is published on a broadcast channel.

use super::machine::SessionMachine;
use super::types::{GameSession, SessionEvent, SessionId, SessionStatus, TickToken};
use crate::amount::Amount;
use crate::config::ArcadeConfig;
use crate::errors::SessionError;
use crate::fairness::{OsSeedSource, SeedSource};
use crate::games::{GameInput, InputEffect, VariantConfig};
use crate::gateway::{
    ConfirmationError, ConfirmationWatcher, PlayerIdentity, SettlementGateway, TxHash, TxReceipt,
    TxStatus,
};
use crate::reward::RewardCalculator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, trace, warn};

pub struct SessionService<G: SettlementGateway> {
    gateway: Arc<G>,
    config: ArcadeConfig,
    watcher: ConfirmationWatcher,
    seeds: Arc<dyn SeedSource>,
    machine: Mutex<SessionMachine>,
    events: broadcast::Sender<SessionEvent>,
}

impl<G: SettlementGateway> SessionService<G> {
    pub fn new(gateway: Arc<G>, config: ArcadeConfig) -> Self {
        Self::with_seed_source(gateway, config, Arc::new(OsSeedSource))
    }

    /// Like [`SessionService::new`] but drawing game seeds from `seeds`.
    pub fn with_seed_source(
        gateway: Arc<G>,
        config: ArcadeConfig,
        seeds: Arc<dyn SeedSource>,
    ) -> Self {
        let watcher = ConfirmationWatcher::new(config.confirmation_timeout(), config.confirmation_poll());
        let (events, _) = broadcast::channel(config.engine.event_capacity);
        let mut machine = SessionMachine::new(config.engine.min_stake);
        if let Some(identity) = &config.engine.identity {
            machine.bind_identity(PlayerIdentity::new(identity.clone()));
        }
        Self {
            gateway,
            config,
            watcher,
            seeds,
            machine: Mutex::new(machine),
            events,
        }
    }

    pub fn config(&self) -> &ArcadeConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn bind_identity(&self, identity: PlayerIdentity) {
        self.machine.lock().await.bind_identity(identity);
    }

    pub async fn unbind_identity(&self) {
        self.machine.lock().await.unbind_identity();
    }

    pub async fn status(&self) -> SessionStatus {
        self.machine.lock().await.status()
    }

    /// Copy of the current session, if any.
    pub async fn snapshot(&self) -> Option<GameSession> {
        self.machine.lock().await.session().cloned()
    }

    pub async fn tick_token(&self) -> Option<TickToken> {
        self.machine.lock().await.tick_token()
    }

    /// Largest payout `stake` can earn on `choice`, before playing.
    pub fn max_reward(&self, stake: Amount, choice: &VariantConfig) -> Result<Amount, SessionError> {
        let rules = self.config.resolve(choice)?;
        Ok(RewardCalculator::max_reward(stake, rules.multiplier())?)
    }

    /// Escrowed balance of the bound identity.
    pub async fn escrow_balance(&self) -> Result<Amount, SessionError> {
        let identity = self
            .machine
            .lock()
            .await
            .identity()
            .cloned()
            .ok_or(SessionError::WalletNotConnected)?;
        Ok(self.gateway.get_balance(&identity).await?)
    }

    /// Deposits `stake` and starts `choice` once the deposit confirms.
    ///
    /// An earlier abandoned deposit is reconciled first: if it has since
    /// landed, its session is resumed and `RecoveredSession` is returned
    /// instead of taking a second stake.
    pub async fn start_session(
        &self,
        stake: Amount,
        choice: VariantConfig,
    ) -> Result<SessionId, SessionError> {
        let rules = self.config.resolve(&choice)?;
        let abandoned = self
            .with_machine(|m| {
                m.check_start(stake)?;
                Ok(m.abandoned_deposit())
            })
            .await?;
        if let Some(receipt) = abandoned {
            self.reconcile_abandoned(receipt).await?;
        }

        let (id, identity) = self
            .with_machine(|m| {
                let id = m.begin_deposit(stake, choice, rules)?;
                let identity = m
                    .identity()
                    .cloned()
                    .ok_or(SessionError::WalletNotConnected)?;
                Ok((id, identity))
            })
            .await?;

        let receipt = match self.gateway.deposit(&identity, stake).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let reason = e.to_string();
                self.with_machine(|m| m.deposit_failed(id, reason.clone())).await?;
                return Err(SessionError::DepositRejected(reason));
            }
        };
        let tx_hash = receipt.tx_hash.clone();
        self.with_machine(|m| m.deposit_submitted(id, receipt)).await?;

        self.await_deposit(id, tx_hash).await?;
        Ok(id)
    }

    /// Polls a deposit that outlived the confirmation timeout again.
    pub async fn resume_deposit(&self) -> Result<SessionId, SessionError> {
        let (id, receipt) = self
            .with_machine(|m| {
                m.pending_deposit().ok_or(SessionError::InvalidTransition {
                    action: "resume deposit",
                    status: m.status(),
                })
            })
            .await?;
        self.await_deposit(id, receipt.tx_hash).await?;
        Ok(id)
    }

    pub async fn handle_input(&self, input: GameInput) -> Result<InputEffect, SessionError> {
        self.with_machine(|m| m.handle_input(input)).await
    }

    /// Advances game timers by `elapsed`; `Ok(false)` means the token is stale.
    pub async fn tick(&self, token: &TickToken, elapsed: Duration) -> Result<bool, SessionError> {
        self.with_machine(|m| m.tick(token, elapsed)).await
    }

    /// Pays the computed reward out of escrow.
    pub async fn withdraw(&self) -> Result<TxReceipt, SessionError> {
        let (id, identity, amount) = self.with_machine(|m| m.begin_withdraw()).await?;

        let receipt = match self.gateway.withdraw(&identity, amount).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let reason = e.to_string();
                self.with_machine(|m| m.withdraw_failed(id, &reason)).await?;
                return Err(SessionError::WithdrawFailed(reason));
            }
        };
        self.with_machine(|m| m.withdraw_submitted(id, receipt.clone()))
            .await?;

        self.await_withdraw(id, &receipt.tx_hash).await?;
        Ok(receipt)
    }

    /// Polls a withdraw that outlived the confirmation timeout again.
    pub async fn resume_withdraw(&self) -> Result<TxReceipt, SessionError> {
        let (id, receipt) = self
            .with_machine(|m| {
                m.pending_withdraw().ok_or(SessionError::InvalidTransition {
                    action: "resume withdraw",
                    status: m.status(),
                })
            })
            .await?;
        self.await_withdraw(id, &receipt.tx_hash).await?;
        Ok(receipt)
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.with_machine(|m| m.reset()).await
    }

    /// Gives up on an abandoned deposit that never resolves so new sessions
    /// can start. Should it confirm later, the stake stays in escrow outside
    /// any session.
    pub async fn discard_abandoned_deposit(&self) -> Result<Option<TxReceipt>, SessionError> {
        let receipt = self.with_machine(|m| Ok(m.discard_abandoned())).await?;
        if let Some(receipt) = &receipt {
            warn!(tx_hash = %receipt.tx_hash, amount = %receipt.amount, "abandoned deposit discarded by operator");
        }
        Ok(receipt)
    }

    async fn await_deposit(&self, id: SessionId, tx_hash: TxHash) -> Result<(), SessionError> {
        match self.watcher.wait(self.gateway.as_ref(), &tx_hash).await {
            Ok(block_number) => {
                let seed = self.seeds.next_seed();
                info!(session_id = %id, %tx_hash, block_number, "deposit confirmed");
                self.with_machine(|m| m.deposit_confirmed(id, seed)).await
            }
            Err(ConfirmationError::Reverted { reason, .. }) => {
                self.with_machine(|m| m.deposit_failed(id, reason.clone()))
                    .await?;
                Err(SessionError::DepositRejected(reason))
            }
            Err(ConfirmationError::Timeout { tx_hash, .. }) => {
                self.with_machine(|m| m.deposit_stalled(id)).await?;
                Err(SessionError::ConfirmationPending { tx_hash })
            }
            Err(ConfirmationError::Gateway(e)) => {
                self.with_machine(|m| m.deposit_stalled(id)).await?;
                Err(SessionError::Gateway(e))
            }
        }
    }

    async fn await_withdraw(&self, id: SessionId, tx_hash: &TxHash) -> Result<(), SessionError> {
        match self.watcher.wait(self.gateway.as_ref(), tx_hash).await {
            Ok(block_number) => {
                debug!(session_id = %id, %tx_hash, block_number, "withdraw confirmed");
                self.with_machine(|m| m.withdraw_confirmed(id)).await
            }
            Err(ConfirmationError::Reverted { reason, .. }) => {
                self.with_machine(|m| m.withdraw_failed(id, &reason)).await?;
                Err(SessionError::WithdrawFailed(reason))
            }
            Err(ConfirmationError::Timeout { tx_hash, .. }) => {
                self.with_machine(|m| m.withdraw_stalled(id)).await?;
                Err(SessionError::ConfirmationPending { tx_hash })
            }
            Err(ConfirmationError::Gateway(e)) => {
                self.with_machine(|m| m.withdraw_stalled(id)).await?;
                Err(SessionError::Gateway(e))
            }
        }
    }

    /// Resolves a deposit left behind by an abandoned session.
    async fn reconcile_abandoned(&self, receipt: TxReceipt) -> Result<(), SessionError> {
        let tx_hash = receipt.tx_hash;
        match self.gateway.transaction_status(&tx_hash).await? {
            TxStatus::Pending => {
                warn!(%tx_hash, "abandoned deposit still pending");
                Err(SessionError::DepositStillPending { tx_hash })
            }
            TxStatus::Reverted { reason } => {
                info!(%tx_hash, %reason, "abandoned deposit reverted");
                self.with_machine(|m| {
                    m.discard_abandoned();
                    Ok(())
                })
                .await
            }
            TxStatus::Confirmed { block_number } => {
                info!(%tx_hash, block_number, "abandoned deposit landed late");
                let seed = self.seeds.next_seed();
                let session_id = self.with_machine(|m| m.recover_abandoned(seed)).await?;
                Err(SessionError::RecoveredSession { session_id })
            }
        }
    }

    /// Runs `f` under the lock and publishes whatever events it produced.
    async fn with_machine<T, F>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut SessionMachine) -> Result<T, SessionError>,
    {
        let mut machine = self.machine.lock().await;
        let result = f(&mut machine);
        for event in machine.drain_events() {
            if self.events.send(event).is_err() {
                trace!("no session event subscribers");
            }
        }
        result
    }
}
