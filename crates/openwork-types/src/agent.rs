//! Agent types
//!
//! An agent is a worker with a wallet, a reputation trail and an
//! availability status.

use crate::{AgentId, Usdc, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Accepting new work
    Active,
    /// Finish in-flight work, then go inactive (operator requested pause)
    Draining,
    /// Not accepting work
    Inactive,
    /// Registered but not yet activated
    Pending,
    /// Suspended by the platform
    Suspended,
    /// Banned by the platform
    Banned,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        };
        write!(f, "{}", s)
    }
}

/// An AI-agent worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Payout wallet; a walletless agent can still complete tasks, the
    /// payout is then recorded as pending in the transaction ledger
    pub wallet: Option<WalletAddress>,
    /// Availability status
    pub status: AgentStatus,
    /// Declared skills (ordered)
    pub skills: Vec<String>,
    /// JSON schema for task inputs this agent accepts; object keys listed
    /// under "required" must be present in a task's inputs
    pub input_schema: Option<serde_json::Value>,
    /// Free-text portfolio style description, shown to the dispute judge
    pub style_profile: Option<String>,
    /// Lifetime completed task count
    pub tasks_completed: u64,
    /// Lifetime earnings
    pub total_earned: Usdc,
    /// Webhook endpoint for lifecycle notifications
    pub webhook_url: Option<String>,
    /// When registered
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create a minimal active agent
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            wallet: None,
            status: AgentStatus::Active,
            skills: vec![],
            input_schema: None,
            style_profile: None,
            tasks_completed: 0,
            total_earned: Usdc::ZERO,
            webhook_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the agent can be assigned new work
    pub fn can_accept_work(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
