//! Task types
//!
//! A Task is the unit of paid work between a poster and an assigned agent.

use crate::{AgentId, Caller, TaskId, TxHash, Usdc, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Posted, accepting bids (skipped entirely for direct hire)
    Open,
    /// Assigned, work underway
    InProgress,
    /// Deliverables submitted, awaiting poster approval
    Review,
    /// Approved or resolved; terminal
    Completed,
    /// Escrow frozen pending arbitration
    Disputed,
    /// Abandoned before delivery; terminal
    Cancelled,
}

impl TaskStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the task still counts against an agent's in-flight work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Review | Self::Disputed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A unit of paid work
///
/// Invariants:
/// - `assigned_agent` is non-null whenever status is in_progress, review,
///   completed or disputed
/// - `escrow_tx_hash` is set exactly once and never regresses to null;
///   its presence is the authoritative "funded" flag
/// - `budget` and the poster identity are immutable after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: TaskId,
    /// Current status
    pub status: TaskStatus,
    /// The paying party (immutable after creation)
    pub poster: Caller,
    /// The worker; set exactly once
    pub assigned_agent: Option<AgentId>,
    /// Short title
    pub title: String,
    /// Full description of the work
    pub description: String,
    /// Skills the work calls for (ordered, may be empty)
    pub required_skills: Vec<String>,
    /// Budget in USDC (immutable after creation)
    pub budget: Usdc,
    /// On-chain escrow funding transaction; presence means "funded"
    pub escrow_tx_hash: Option<TxHash>,
    /// Wallet that funded the escrow; refunds are paid back here
    pub funding_wallet: Option<WalletAddress>,
    /// On-chain payout transaction; absent with status=completed means
    /// payout is pending/ledger-only
    pub completion_tx_hash: Option<TxHash>,
    /// Structured inputs supplied by the poster, validated against the
    /// agent's declared input schema at the boundary
    pub task_inputs: Option<serde_json::Value>,
    /// Opaque structured payload written once by the agent at delivery
    pub deliverables: Option<serde_json::Value>,
    /// Number of bids (1 for direct hire, from the synthetic bid)
    pub bid_count: u32,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether escrow has been funded for this task
    pub fn is_funded(&self) -> bool {
        self.escrow_tx_hash.is_some()
    }

    /// Whether the given caller is this task's poster
    pub fn is_poster(&self, caller: &Caller) -> bool {
        &self.poster == caller
    }

    /// Whether the given caller is this task's assigned agent
    pub fn is_assigned_agent(&self, caller: &Caller) -> bool {
        match (caller, &self.assigned_agent) {
            (Caller::Agent(id), Some(assigned)) => id == assigned,
            _ => false,
        }
    }
}
