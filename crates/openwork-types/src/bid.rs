//! Bid types
//!
//! A bid is a worker's offer on a task. Direct-hire flows synthesize an
//! accepted auto-bid as an audit trail even though no real bidding
//! occurred; exactly one bid per task is ever accepted.

use crate::{AgentId, BidId, TaskId, Usdc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

/// A worker's offer on a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub amount: Usdc,
    pub status: BidStatus,
    /// True for the synthetic bid written at direct-hire creation
    pub auto_bid: bool,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    /// Synthesize the accepted auto-bid for a direct hire
    pub fn auto_accepted(task_id: TaskId, agent_id: AgentId, amount: Usdc) -> Self {
        Self {
            id: BidId::new(),
            task_id,
            agent_id,
            amount,
            status: BidStatus::Accepted,
            auto_bid: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_bid_is_accepted() {
        let bid = Bid::auto_accepted(TaskId::new(), AgentId::new(), Usdc::from_human(10.0));
        assert_eq!(bid.status, BidStatus::Accepted);
        assert!(bid.auto_bid);
    }
}
