//! Ledger transaction rows
//!
//! Append-only records of escrow release/refund attempts. A row is written
//! whenever an on-chain movement could not be confirmed synchronously, so
//! the ledger and chain state can be reconciled later without re-deriving
//! state from the chain under time pressure.

use crate::{LedgerTxId, TaskId, TxHash, Usdc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of value movement the row records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxType {
    /// Payout toward the agent on approval/resolution
    EscrowRelease,
    /// Refund toward the poster on cancellation/resolution
    EscrowRefund,
}

/// Outcome recorded for the movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxStatus {
    /// Attempted but not confirmed; awaiting reconciliation
    Pending,
    /// Chain rejected the movement
    Failed,
    /// Confirmed on-chain
    Completed,
}

/// Append-only ledger row for an escrow movement attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: LedgerTxId,
    pub task_id: TaskId,
    pub tx_type: LedgerTxType,
    pub status: LedgerTxStatus,
    pub amount: Usdc,
    /// Present only when the chain confirmed the movement
    pub tx_hash: Option<TxHash>,
    /// Human-readable context for the reconciler
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(
        task_id: TaskId,
        tx_type: LedgerTxType,
        status: LedgerTxStatus,
        amount: Usdc,
        tx_hash: Option<TxHash>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: LedgerTxId::new(),
            task_id,
            tx_type,
            status,
            amount,
            tx_hash,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_row_carries_reconciliation_context() {
        let row = LedgerTransaction::new(
            TaskId::new(),
            LedgerTxType::EscrowRelease,
            LedgerTxStatus::Pending,
            Usdc::from_human(9.20),
            None,
            "agent has no wallet on file",
        );
        assert_eq!(row.status, LedgerTxStatus::Pending);
        assert!(row.tx_hash.is_none());
        assert!(!row.detail.is_empty());
    }
}
