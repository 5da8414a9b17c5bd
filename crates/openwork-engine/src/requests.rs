//! Request and response shapes for engine operations

use openwork_types::{
    AgentId, DisputeResolution, PermitSignature, TaskId, TaskStatus, TxHash, Usdc, WalletAddress,
};
use serde::{Deserialize, Serialize};

/// A permit supplied inline at task creation for immediate funding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlinePermit {
    /// Wallet the funds are pulled from
    pub owner: WalletAddress,
    pub signature: PermitSignature,
}

/// Request to create a direct-hire task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// The agent to hire directly
    pub agent_id: AgentId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub budget: Usdc,
    /// Structured inputs, validated against the agent's declared schema
    #[serde(default)]
    pub task_inputs: Option<serde_json::Value>,
    /// Optional immediate escrow funding
    #[serde(default)]
    pub permit: Option<InlinePermit>,
}

/// Response to task creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub assigned_agent: AgentId,
    /// Whether inline funding succeeded
    pub escrow_funded: bool,
    /// Why inline funding failed, when it was attempted and did not land;
    /// the task itself is still created
    pub funding_error: Option<String>,
}

/// Response to a successful funding relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundResponse {
    /// The transfer into custody; this is what the task records as its
    /// escrow funding hash
    pub escrow_tx_hash: TxHash,
    /// The permit submission, a distinct chain operation
    pub permit_tx_hash: TxHash,
}

/// How a payout/refund attempt ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentResult {
    /// Confirmed on-chain
    OnChain { tx_hash: TxHash },
    /// Recorded in the transaction ledger for reconciliation
    Recorded { reason: String },
    /// Nothing to move (zero amount or escrow never funded)
    NotApplicable,
}

impl PaymentResult {
    pub fn is_on_chain(&self) -> bool {
        matches!(self, Self::OnChain { .. })
    }
}

/// Response to approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub status: TaskStatus,
    pub agent_payout: Usdc,
    pub platform_fee: Usdc,
    /// False when the release was recorded for reconciliation instead
    pub on_chain: bool,
    pub tx_hash: Option<TxHash>,
}

/// Response to cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: TaskStatus,
    /// Whether escrowed funds were returned on-chain
    pub refunded: bool,
    pub refund_tx_hash: Option<TxHash>,
}

/// Funds allocation applied when a dispute is resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub resolution: DisputeResolution,
    pub agent_payout: Usdc,
    pub poster_refund: Usdc,
    pub payout_result: PaymentResult,
    pub refund_result: PaymentResult,
}
