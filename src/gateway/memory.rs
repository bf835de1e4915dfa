//! In-process escrow gateway
//!
//! Mirrors the escrow contract closely enough to drive the engine in tests
//! and the demo binary: wallet balances, per-player escrow, an operator
//! funded prize pool for payouts above the escrowed stake, and scripted
//! confirmation behaviour per transaction.

use super::{GatewayError, PlayerIdentity, SettlementGateway, TxHash, TxKind, TxReceipt, TxStatus};
use crate::amount::Amount;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// How the next submitted transaction resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxBehavior {
    /// Confirmed on the first status poll
    ConfirmImmediately,
    /// Confirmed once polled this many times
    ConfirmAfterPolls(u32),
    /// Reverted on the first status poll
    Revert(String),
    /// Pending until forced with [`InMemoryGateway::force_confirm`]
    StayPending,
    /// Refused at submission
    RejectSubmission(String),
}

struct TxRecord {
    receipt: TxReceipt,
    behavior: TxBehavior,
    polls: u32,
    status: TxStatus,
}

pub struct InMemoryGateway {
    wallets: DashMap<PlayerIdentity, Amount>,
    escrow: DashMap<PlayerIdentity, Amount>,
    prize_pool: Mutex<Amount>,
    transactions: DashMap<TxHash, TxRecord>,
    script: Mutex<VecDeque<TxBehavior>>,
    nonce: AtomicU64,
    block_height: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
            escrow: DashMap::new(),
            prize_pool: Mutex::new(Amount::ZERO),
            transactions: DashMap::new(),
            script: Mutex::new(VecDeque::new()),
            nonce: AtomicU64::new(0),
            block_height: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    pub fn fund_wallet(&self, identity: &PlayerIdentity, amount: Amount) {
        let mut balance = self.wallets.entry(identity.clone()).or_insert(Amount::ZERO);
        *balance = *balance + amount;
    }

    pub fn wallet_balance(&self, identity: &PlayerIdentity) -> Amount {
        self.wallets.get(identity).map(|b| *b).unwrap_or(Amount::ZERO)
    }

    /// Operator top-up that backs payouts above a player's escrow.
    pub fn fund_prize_pool(&self, amount: Amount) {
        let mut pool = self.prize_pool.lock().unwrap_or_else(|e| e.into_inner());
        *pool = *pool + amount;
    }

    pub fn prize_pool(&self) -> Amount {
        *self.prize_pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues the behaviour of the next submitted transaction.
    pub fn script_next(&self, behavior: TxBehavior) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(behavior);
    }

    /// Simulates an unreachable RPC endpoint.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Lands a pending transaction regardless of its script.
    pub fn force_confirm(&self, tx_hash: &TxHash) -> Result<(), GatewayError> {
        let mut record = self
            .transactions
            .get_mut(tx_hash)
            .ok_or_else(|| GatewayError::UnknownTransaction(tx_hash.clone()))?;
        if record.status == TxStatus::Pending {
            let status = self.apply(&record.receipt);
            record.status = status;
        }
        Ok(())
    }

    /// Drops a pending transaction without applying it.
    pub fn force_revert(&self, tx_hash: &TxHash, reason: &str) -> Result<(), GatewayError> {
        let mut record = self
            .transactions
            .get_mut(tx_hash)
            .ok_or_else(|| GatewayError::UnknownTransaction(tx_hash.clone()))?;
        if record.status == TxStatus::Pending {
            record.status = TxStatus::Reverted {
                reason: reason.to_string(),
            };
        }
        Ok(())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn next_behavior(&self) -> TxBehavior {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(TxBehavior::ConfirmImmediately)
    }

    fn escrow_balance(&self, identity: &PlayerIdentity) -> Amount {
        self.escrow.get(identity).map(|b| *b).unwrap_or(Amount::ZERO)
    }

    fn submit(
        &self,
        kind: TxKind,
        identity: &PlayerIdentity,
        amount: Amount,
    ) -> Result<TxReceipt, GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("rpc endpoint unreachable".to_string()));
        }
        let behavior = self.next_behavior();
        if let TxBehavior::RejectSubmission(reason) = &behavior {
            return Err(GatewayError::Unavailable(reason.clone()));
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(kind.to_string().as_bytes());
        hasher.update(identity.as_str().as_bytes());
        hasher.update(amount.units().to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        let tx_hash = TxHash(format!("0x{}", hex::encode(hasher.finalize())));

        let receipt = TxReceipt {
            tx_hash: tx_hash.clone(),
            kind,
            identity: identity.clone(),
            amount,
            submitted_at: Utc::now(),
        };
        debug!(%tx_hash, %kind, %amount, "transaction submitted");
        self.transactions.insert(
            tx_hash,
            TxRecord {
                receipt: receipt.clone(),
                behavior,
                polls: 0,
                status: TxStatus::Pending,
            },
        );
        Ok(receipt)
    }

    /// Executes a transaction's balance effects and returns its final status.
    /// Checks are repeated here because balances may have moved since submission.
    fn apply(&self, receipt: &TxReceipt) -> TxStatus {
        let identity = &receipt.identity;
        let amount = receipt.amount;
        match receipt.kind {
            TxKind::Deposit => {
                let available = self.wallet_balance(identity);
                if available < amount {
                    return TxStatus::Reverted {
                        reason: "insufficient wallet balance".to_string(),
                    };
                }
                self.wallets.insert(identity.clone(), available - amount);
                let escrowed = self.escrow_balance(identity);
                self.escrow.insert(identity.clone(), escrowed + amount);
            }
            TxKind::Withdraw => {
                let escrowed = self.escrow_balance(identity);
                let mut pool = self.prize_pool.lock().unwrap_or_else(|e| e.into_inner());
                if escrowed + *pool < amount {
                    return TxStatus::Reverted {
                        reason: "insufficient escrow".to_string(),
                    };
                }
                let from_escrow = escrowed.min(amount);
                self.escrow.insert(identity.clone(), escrowed - from_escrow);
                *pool = *pool - (amount - from_escrow);
                drop(pool);
                self.fund_wallet(identity, amount);
            }
        }
        TxStatus::Confirmed {
            block_number: self.block_height.fetch_add(1, Ordering::SeqCst),
        }
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementGateway for InMemoryGateway {
    async fn deposit(
        &self,
        identity: &PlayerIdentity,
        amount: Amount,
    ) -> Result<TxReceipt, GatewayError> {
        if !amount.is_positive() {
            return Err(GatewayError::InvalidAmount(amount));
        }
        let available = self.wallet_balance(identity);
        if available < amount {
            return Err(GatewayError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.submit(TxKind::Deposit, identity, amount)
    }

    async fn withdraw(
        &self,
        identity: &PlayerIdentity,
        amount: Amount,
    ) -> Result<TxReceipt, GatewayError> {
        if !amount.is_positive() {
            return Err(GatewayError::InvalidAmount(amount));
        }
        let available = self.escrow_balance(identity) + self.prize_pool();
        if available < amount {
            return Err(GatewayError::InsufficientEscrow {
                needed: amount,
                available,
            });
        }
        self.submit(TxKind::Withdraw, identity, amount)
    }

    async fn get_balance(&self, identity: &PlayerIdentity) -> Result<Amount, GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("rpc endpoint unreachable".to_string()));
        }
        Ok(self.escrow_balance(identity))
    }

    async fn transaction_status(&self, tx_hash: &TxHash) -> Result<TxStatus, GatewayError> {
        let mut record = self
            .transactions
            .get_mut(tx_hash)
            .ok_or_else(|| GatewayError::UnknownTransaction(tx_hash.clone()))?;
        if record.status != TxStatus::Pending {
            return Ok(record.status.clone());
        }

        record.polls += 1;
        let status = match record.behavior.clone() {
            TxBehavior::ConfirmImmediately => self.apply(&record.receipt),
            TxBehavior::ConfirmAfterPolls(n) if record.polls >= n => self.apply(&record.receipt),
            TxBehavior::Revert(reason) => TxStatus::Reverted { reason },
            _ => TxStatus::Pending,
        };
        record.status = status.clone();
        Ok(status)
    }
}
