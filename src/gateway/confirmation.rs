//! Waiting for submitted transactions to land.

use super::{GatewayError, SettlementGateway, TxHash, TxStatus};
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    #[error("Transaction {tx_hash} reverted: {reason}")]
    Reverted { tx_hash: TxHash, reason: String },

    /// Still pending when the wait ran out. The transaction may yet land.
    #[error("Transaction {tx_hash} still pending after {timeout_ms}ms")]
    Timeout { tx_hash: TxHash, timeout_ms: u64 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Polls a gateway until a transaction is confirmed, reverted, or the
/// timeout passes.
#[derive(Debug, Clone)]
pub struct ConfirmationWatcher {
    timeout: Duration,
    poll_interval: Duration,
}

impl ConfirmationWatcher {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the block number the transaction was confirmed in.
    pub async fn wait<G>(&self, gateway: &G, tx_hash: &TxHash) -> Result<u64, ConfirmationError>
    where
        G: SettlementGateway + ?Sized,
    {
        match tokio::time::timeout(self.timeout, self.poll(gateway, tx_hash)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%tx_hash, timeout_ms = self.timeout.as_millis() as u64, "confirmation wait timed out");
                Err(ConfirmationError::Timeout {
                    tx_hash: tx_hash.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn poll<G>(&self, gateway: &G, tx_hash: &TxHash) -> Result<u64, ConfirmationError>
    where
        G: SettlementGateway + ?Sized,
    {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            match gateway.transaction_status(tx_hash).await? {
                TxStatus::Pending => {
                    trace!(%tx_hash, "transaction pending");
                }
                TxStatus::Confirmed { block_number } => {
                    debug!(%tx_hash, block_number, "transaction confirmed");
                    return Ok(block_number);
                }
                TxStatus::Reverted { reason } => {
                    return Err(ConfirmationError::Reverted {
                        tx_hash: tx_hash.clone(),
                        reason,
                    });
                }
            }
        }
    }
}
