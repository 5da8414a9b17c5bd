//! Dispute types
//!
//! A dispute freezes settlement pending arbitration. One active dispute
//! per task at a time; resolving closes it before another can open.

use crate::{Caller, DisputeId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// How disputed funds are allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum DisputeResolution {
    /// Everything back to the poster
    FullRefund,
    /// Everything to the agent (minus platform fee)
    FullPayout,
    /// refund_percentage back to the poster, remainder paid out
    PartialSplit { refund_percentage: u8 },
}

impl fmt::Display for DisputeResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullRefund => write!(f, "full_refund"),
            Self::FullPayout => write!(f, "full_payout"),
            Self::PartialSplit { refund_percentage } => {
                write!(f, "partial_split({}%)", refund_percentage)
            }
        }
    }
}

/// An escalation that freezes settlement pending arbitration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub task_id: TaskId,
    /// Either party may open a dispute
    pub opened_by: Caller,
    /// Free-text reason given at opening
    pub reason: String,
    pub status: DisputeStatus,
    /// Set when resolved
    pub resolution: Option<DisputeResolution>,
    /// Audit note: truncated judge reasoning, or the judge failure message
    pub note: Option<String>,
    /// Actor identity that resolved this dispute
    pub resolved_by: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Open a new dispute on a task
    pub fn open(task_id: TaskId, opened_by: Caller, reason: impl Into<String>) -> Self {
        Self {
            id: DisputeId::new(),
            task_id,
            opened_by,
            reason: reason.into(),
            status: DisputeStatus::Open,
            resolution: None,
            note: None,
            resolved_by: None,
            opened_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == DisputeStatus::Resolved
    }
}

/// Verdict produced by the automated judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// The resolution to apply, exactly as recommended
    pub recommendation: DisputeResolution,
    /// Overall quality score (0-100)
    pub score: u8,
    /// How complete the delivery is against the description (0-100)
    pub completeness: u8,
    /// How the delivery compares to the agent's declared portfolio style (0-100)
    pub quality_vs_portfolio: u8,
    /// Free-text reasoning; truncated before storage
    pub reasoning: String,
}
