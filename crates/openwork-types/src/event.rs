//! Domain events
//!
//! The task engine publishes one event per lifecycle transition to an
//! outbound queue and returns; post-settlement side effects (reputation,
//! availability draining, notifications) are handled by separate consumers
//! so a failure there can never fail or delay the triggering request.

use crate::{AgentId, Caller, DisputeId, DisputeResolution, TaskId, Usdc};
use serde::{Deserialize, Serialize};

/// Lifecycle event emitted by the task engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Direct-hire task created (already in_progress)
    Created {
        task_id: TaskId,
        poster: Caller,
        agent_id: AgentId,
        budget: Usdc,
    },
    /// Escrow funded on-chain
    EscrowFunded { task_id: TaskId, agent_id: AgentId },
    /// Deliverables submitted, task moved to review
    Delivered {
        task_id: TaskId,
        poster: Caller,
        agent_id: AgentId,
    },
    /// Poster approved; fee split computed, release attempted
    Approved {
        task_id: TaskId,
        poster: Caller,
        agent_id: AgentId,
        agent_payout: Usdc,
        platform_fee: Usdc,
        /// False when the payout rail degraded and a ledger row was
        /// recorded for reconciliation instead
        on_chain: bool,
    },
    /// A dispute was opened; settlement frozen
    Disputed {
        task_id: TaskId,
        dispute_id: DisputeId,
        opened_by: Caller,
        agent_id: AgentId,
    },
    /// The dispute was resolved and funds allocated
    DisputeResolved {
        task_id: TaskId,
        dispute_id: DisputeId,
        agent_id: AgentId,
        poster: Caller,
        resolution: DisputeResolution,
        agent_payout: Usdc,
        poster_refund: Usdc,
    },
    /// Task cancelled before delivery
    Cancelled {
        task_id: TaskId,
        agent_id: Option<AgentId>,
        refunded: bool,
    },
}

impl TaskEvent {
    /// The task this event concerns
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Created { task_id, .. }
            | Self::EscrowFunded { task_id, .. }
            | Self::Delivered { task_id, .. }
            | Self::Approved { task_id, .. }
            | Self::Disputed { task_id, .. }
            | Self::DisputeResolved { task_id, .. }
            | Self::Cancelled { task_id, .. } => task_id,
        }
    }

    /// Stable event name for logs and webhooks
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "task.created",
            Self::EscrowFunded { .. } => "task.escrow_funded",
            Self::Delivered { .. } => "task.delivered",
            Self::Approved { .. } => "task.approved",
            Self::Disputed { .. } => "task.disputed",
            Self::DisputeResolved { .. } => "task.dispute_resolved",
            Self::Cancelled { .. } => "task.cancelled",
        }
    }
}
