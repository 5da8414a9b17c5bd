//! OpenWork Engine - the task lifecycle state machine
//!
//! Owns every valid transition and its preconditions and side effects:
//!
//! ```text
//! (direct hire) ──► in_progress ──► review ──► completed
//!                        │             │
//!                        │             └──► disputed ──► completed
//!                        └──► cancelled          (per resolution)
//! ```
//!
//! Authorization and status checks run before any write; task mutations
//! commit as single critical sections in the store. On-chain settlement is
//! best-effort on approval: status progression is never held hostage by
//! payment-rail failures - the discrepancy is recorded in the transaction
//! ledger for reconciliation instead.
//!
//! Side effects that are not money-safety-critical (reputation,
//! availability draining, notifications) are published as domain events to
//! an outbound queue and handled by separate consumers.

mod engine;
mod requests;

pub use engine::TaskEngine;
pub use requests::{
    ApprovalResponse, CancelResponse, CreateTaskRequest, CreateTaskResponse, FundResponse,
    InlinePermit, PaymentResult, SettlementOutcome,
};
