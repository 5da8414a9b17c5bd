//! OpenWork Store - the single source of truth for settlement state
//!
//! The store is authoritative for "is this task funded": only the task's
//! `escrow_tx_hash` answers that question, never the chain, because chain
//! confirmation and ledger write are not atomic.
//!
//! # Invariants
//!
//! 1. `escrow_tx_hash` is set by compare-and-swap: a second funding attempt
//!    observes the already-set field and fails with a conflict
//! 2. Task mutations run as a single critical section under the write lock,
//!    so precondition checks and the write cannot interleave
//! 3. At most one open dispute per task
//! 4. Transaction rows are append-only

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use openwork_types::{
    Agent, AgentId, Bid, Dispute, DisputeId, DisputeStatus, LedgerTransaction, Task, TaskId,
    TxHash, WalletAddress, WorkError, WorkResult,
};

/// An in-app inbox message delivered by the notification dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Recipient id string (agent or human)
    pub recipient: String,
    /// Stable event name (e.g. "task.approved")
    pub event: String,
    /// Human-readable body
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The OpenWork market store
///
/// Thread-safe, designed for concurrent request-scoped access.
#[derive(Clone, Default)]
pub struct MarketStore {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    bids: Arc<RwLock<Vec<Bid>>>,
    disputes: Arc<RwLock<HashMap<DisputeId, Dispute>>>,
    transactions: Arc<RwLock<Vec<LedgerTransaction>>>,
    inbox: Arc<RwLock<Vec<InboxMessage>>>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Agents
    // ========================================================================

    pub async fn insert_agent(&self, agent: Agent) {
        self.agents.write().await.insert(agent.id.clone(), agent);
    }

    pub async fn agent(&self, id: &AgentId) -> WorkResult<Agent> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkError::AgentNotFound {
                agent_id: id.to_string(),
            })
    }

    /// Mutate an agent under the write lock; the mutation is applied to a
    /// copy and committed only on success
    pub async fn update_agent<F>(&self, id: &AgentId, f: F) -> WorkResult<Agent>
    where
        F: FnOnce(&mut Agent) -> WorkResult<()>,
    {
        let mut agents = self.agents.write().await;
        let current = agents.get(id).ok_or_else(|| WorkError::AgentNotFound {
            agent_id: id.to_string(),
        })?;

        let mut updated = current.clone();
        f(&mut updated)?;
        updated.updated_at = Utc::now();
        agents.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub async fn insert_task(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    pub async fn task(&self, id: &TaskId) -> WorkResult<Task> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkError::TaskNotFound {
                task_id: id.to_string(),
            })
    }

    /// Mutate a task as a single critical section
    ///
    /// The closure sees a copy; precondition failures leave the stored task
    /// untouched. `updated_at` is bumped on commit.
    pub async fn update_task<F>(&self, id: &TaskId, f: F) -> WorkResult<Task>
    where
        F: FnOnce(&mut Task) -> WorkResult<()>,
    {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get(id).ok_or_else(|| WorkError::TaskNotFound {
            task_id: id.to_string(),
        })?;

        let mut updated = current.clone();
        f(&mut updated)?;
        updated.updated_at = Utc::now();
        tasks.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    /// Record the escrow funding hash, compare-and-swap style
    ///
    /// The second of two concurrent funding attempts observes the
    /// already-set field here and fails with a conflict; the hash written
    /// by the first attempt is never altered.
    pub async fn set_escrow_tx(
        &self,
        id: &TaskId,
        hash: TxHash,
        funding_wallet: WalletAddress,
    ) -> WorkResult<Task> {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get(id).ok_or_else(|| WorkError::TaskNotFound {
            task_id: id.to_string(),
        })?;

        if current.escrow_tx_hash.is_some() {
            return Err(WorkError::EscrowAlreadyFunded {
                task_id: id.to_string(),
            });
        }

        let mut updated = current.clone();
        updated.escrow_tx_hash = Some(hash);
        updated.funding_wallet = Some(funding_wallet);
        updated.updated_at = Utc::now();
        tasks.insert(id.clone(), updated.clone());
        debug!(task = %id, "escrow tx recorded");
        Ok(updated)
    }

    /// Count of tasks still in flight for an agent
    /// (in_progress, review or disputed)
    pub async fn active_task_count(&self, agent_id: &AgentId) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.assigned_agent.as_ref() == Some(agent_id) && t.status.is_active())
            .count()
    }

    // ========================================================================
    // Bids
    // ========================================================================

    pub async fn insert_bid(&self, bid: Bid) {
        self.bids.write().await.push(bid);
    }

    pub async fn bids_for_task(&self, task_id: &TaskId) -> Vec<Bid> {
        self.bids
            .read()
            .await
            .iter()
            .filter(|b| &b.task_id == task_id)
            .cloned()
            .collect()
    }

    // ========================================================================
    // Disputes
    // ========================================================================

    /// Open a dispute; fails with a conflict if the task already has one open
    pub async fn open_dispute(&self, dispute: Dispute) -> WorkResult<Dispute> {
        let mut disputes = self.disputes.write().await;
        let already_open = disputes
            .values()
            .any(|d| d.task_id == dispute.task_id && d.status == DisputeStatus::Open);
        if already_open {
            return Err(WorkError::DisputeAlreadyOpen {
                task_id: dispute.task_id.to_string(),
            });
        }
        disputes.insert(dispute.id.clone(), dispute.clone());
        Ok(dispute)
    }

    pub async fn dispute(&self, id: &DisputeId) -> WorkResult<Dispute> {
        self.disputes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkError::DisputeNotFound {
                dispute_id: id.to_string(),
            })
    }

    /// Mutate a dispute under the write lock, commit-on-success
    pub async fn update_dispute<F>(&self, id: &DisputeId, f: F) -> WorkResult<Dispute>
    where
        F: FnOnce(&mut Dispute) -> WorkResult<()>,
    {
        let mut disputes = self.disputes.write().await;
        let current = disputes.get(id).ok_or_else(|| WorkError::DisputeNotFound {
            dispute_id: id.to_string(),
        })?;

        let mut updated = current.clone();
        f(&mut updated)?;
        disputes.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    // ========================================================================
    // Transaction ledger (append-only)
    // ========================================================================

    pub async fn record_transaction(&self, tx: LedgerTransaction) {
        debug!(task = %tx.task_id, status = ?tx.status, "ledger transaction recorded");
        self.transactions.write().await.push(tx);
    }

    pub async fn transactions_for_task(&self, task_id: &TaskId) -> Vec<LedgerTransaction> {
        self.transactions
            .read()
            .await
            .iter()
            .filter(|t| &t.task_id == task_id)
            .cloned()
            .collect()
    }

    // ========================================================================
    // In-app inbox
    // ========================================================================

    pub async fn push_inbox(&self, message: InboxMessage) {
        self.inbox.write().await.push(message);
    }

    pub async fn inbox_for(&self, recipient: &str) -> Vec<InboxMessage> {
        self.inbox
            .read()
            .await
            .iter()
            .filter(|m| m.recipient == recipient)
            .cloned()
            .collect()
    }
}
