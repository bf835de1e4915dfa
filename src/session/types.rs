use crate::amount::Amount;
use crate::games::{GameProgress, GameVariant, VariantConfig, VariantRules};
use crate::gateway::{PlayerIdentity, TxHash, TxKind, TxReceipt};
use crate::reward::SettlementResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session identifier, minted by `start_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    AwaitingDeposit,
    Active,
    /// Game over, reward computed, payout not yet confirmed
    AwaitingSettlement,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::AwaitingDeposit => "awaiting_deposit",
            SessionStatus::Active => "active",
            SessionStatus::AwaitingSettlement => "awaiting_settlement",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One staked play-through, from deposit request to payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub identity: PlayerIdentity,
    pub variant: GameVariant,
    pub stake: Amount,
    pub status: SessionStatus,
    pub config: VariantConfig,
    pub rules: VariantRules,
    /// `sha256(id || seed)`, published when play starts
    pub seed_commitment: Option<String>,
    /// Seed the rule module was built from; revealed once the game ends
    pub seed: Option<u64>,
    pub progress: Option<GameProgress>,
    pub deposit: Option<TxReceipt>,
    pub withdraw: Option<TxReceipt>,
    pub settlement: Option<SettlementResult>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameSession {
    pub fn new(
        identity: PlayerIdentity,
        stake: Amount,
        config: VariantConfig,
        rules: VariantRules,
    ) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            variant: rules.variant(),
            stake,
            status: SessionStatus::AwaitingDeposit,
            config,
            rules,
            seed_commitment: None,
            seed: None,
            progress: None,
            deposit: None,
            withdraw: None,
            settlement: None,
            failure_reason: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// Capability to advance the timers of one particular active phase.
///
/// Any status change bumps the machine's generation, so a token held by a
/// ticker that outlived its phase no longer matches and its ticks are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickToken {
    pub session_id: SessionId,
    pub generation: u64,
}

/// Notifications published by the session service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },
    Progress {
        session_id: SessionId,
        progress: GameProgress,
    },
    SettlementComputed {
        session_id: SessionId,
        result: SettlementResult,
    },
    /// A transaction is still pending after the confirmation timeout.
    ConfirmationDelayed {
        session_id: SessionId,
        kind: TxKind,
        tx_hash: TxHash,
    },
    Withdrawn {
        session_id: SessionId,
        amount: Amount,
        tx_hash: TxHash,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::StatusChanged { session_id, .. }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::SettlementComputed { session_id, .. }
            | SessionEvent::ConfirmationDelayed { session_id, .. }
            | SessionEvent::Withdrawn { session_id, .. } => *session_id,
        }
    }
}
