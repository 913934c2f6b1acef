//! Errors surfaced by transaction submission.

use alloy::primitives::B256;
use thiserror::Error;

/// Failure to get a liquidation mined.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The transaction never reached the mempool (signing, RPC, nonce).
    #[error("failed to submit transaction to {to}: {reason}")]
    Submit { to: String, reason: String },

    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    /// The receipt could not be obtained after submission.
    #[error("transaction {tx_hash} submitted but receipt unavailable: {reason}")]
    Receipt { tx_hash: B256, reason: String },
}

impl ExecutionError {
    /// Transaction hash, when the failure happened after submission.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Submit { .. } => None,
            Self::Reverted { tx_hash } | Self::Receipt { tx_hash, .. } => Some(*tx_hash),
        }
    }
}
