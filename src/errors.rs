//! Error types for the arcade engine
//!
//! Rule modules, the gateway and the reward calculator each keep their own
//! error enum next to the code. This module holds the session-level taxonomy
//! surfaced to callers, configuration errors, and the root [`ArcadeError`].

use crate::amount::Amount;
use crate::games::MoveError;
use crate::gateway::{ConfirmationError, GatewayError, TxHash};
use crate::reward::RewardError;
use crate::session::{SessionId, SessionStatus};

/// Root error type for binaries and glue code
#[derive(Debug, thiserror::Error)]
pub enum ArcadeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Confirmation error: {0}")]
    Confirmation(#[from] ConfirmationError),
}

/// Configuration and validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Errors surfaced by the session state machine and service.
///
/// Gateway-facing failures are reported once and never retried by the
/// engine; the caller decides whether to try again.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid stake {stake}: {reason}")]
    InvalidStake { stake: Amount, reason: String },

    #[error("No wallet identity is bound")]
    WalletNotConnected,

    #[error("Deposit rejected: {0}")]
    DepositRejected(String),

    #[error("Withdraw failed: {0}")]
    WithdrawFailed(String),

    /// Rejected locally by the rule module; the session is unaffected.
    #[error("Invalid move: {0}")]
    InvalidMove(#[from] MoveError),

    /// The transaction outlived the confirmation timeout and may still land.
    #[error("Transaction {tx_hash} is still pending")]
    ConfirmationPending { tx_hash: TxHash },

    #[error("A withdraw is already in flight ({tx_hash:?})")]
    WithdrawInFlight { tx_hash: Option<TxHash> },

    #[error("Nothing to withdraw")]
    NothingToWithdraw,

    #[error("A session is already {0}")]
    SessionBusy(SessionStatus),

    #[error("Cannot {action} while {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("Session {0} is not the current session")]
    UnknownSession(SessionId),

    /// An abandoned deposit has not resolved yet.
    #[error("Earlier deposit {tx_hash} is still pending")]
    DepositStillPending { tx_hash: TxHash },

    /// An abandoned deposit landed; its session was resumed instead of
    /// starting a new one.
    #[error("Earlier deposit confirmed; session {session_id} resumed")]
    RecoveredSession { session_id: SessionId },

    #[error(transparent)]
    Reward(#[from] RewardError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type ArcadeResult<T> = Result<T, ArcadeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = ConfigurationError::ValidationFailed("tick too slow".to_string());
        let arcade: ArcadeError = err.into();
        assert!(arcade.to_string().contains("Configuration error"));
        assert!(arcade.to_string().contains("tick too slow"));
    }

    #[test]
    fn test_move_error_converts() {
        let err: SessionError = MoveError::BoardBusy.into();
        assert_eq!(err, SessionError::InvalidMove(MoveError::BoardBusy));
        assert!(err.to_string().contains("still on display"));
    }

    #[test]
    fn test_transition_message() {
        let err = SessionError::InvalidTransition {
            action: "withdraw",
            status: SessionStatus::Active,
        };
        assert_eq!(err.to_string(), "Cannot withdraw while active");
    }

    #[test]
    fn test_error_source() {
        let arcade = ArcadeError::Session(SessionError::Gateway(GatewayError::Unavailable(
            "rpc down".to_string(),
        )));
        assert!(arcade.source().is_some());
    }
}
