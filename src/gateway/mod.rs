//! Settlement gateway interface
//!
//! The escrow contract is an external collaborator. The engine only needs to
//! submit deposits and withdrawals, read the escrowed balance, and poll a
//! submitted transaction until it lands.

pub mod confirmation;
pub mod memory;

pub use confirmation::{ConfirmationError, ConfirmationWatcher};
pub use memory::{InMemoryGateway, TxBehavior};

use crate::amount::Amount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallet address the escrow is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerIdentity(String);

impl PlayerIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex transaction hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdraw,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKind::Deposit => write!(f, "deposit"),
            TxKind::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Receipt for a submitted transaction. Submission is not confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub kind: TxKind,
    pub identity: PlayerIdentity,
    pub amount: Amount,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed { block_number: u64 },
    Reverted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Amount),

    #[error("Insufficient wallet balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("Insufficient escrow: need {needed}, have {available}")]
    InsufficientEscrow { needed: Amount, available: Amount },

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TxHash),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Escrow contract client.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Submits a deposit of `amount` from the caller's wallet into escrow.
    async fn deposit(&self, identity: &PlayerIdentity, amount: Amount)
        -> Result<TxReceipt, GatewayError>;

    /// Submits a payout of `amount` from escrow back to the caller.
    async fn withdraw(&self, identity: &PlayerIdentity, amount: Amount)
        -> Result<TxReceipt, GatewayError>;

    /// Escrowed balance for `identity`.
    async fn get_balance(&self, identity: &PlayerIdentity) -> Result<Amount, GatewayError>;

    async fn transaction_status(&self, tx_hash: &TxHash) -> Result<TxStatus, GatewayError>;
}
