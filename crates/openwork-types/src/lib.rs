//! OpenWork Types - Canonical domain types for the settlement engine
//!
//! This crate contains all foundational types for OpenWork with zero
//! dependencies on other openwork crates. It defines the complete type
//! system for:
//!
//! - Identity types (TaskId, AgentId, DisputeId, etc.)
//! - Micro-USDC fixed-point amounts
//! - Task, Agent, Bid, Dispute and ledger transaction records
//! - Gasless permit types (EIP-2612-style)
//! - Domain events published by the task engine
//!
//! # Money-safety invariants
//!
//! These types support the core settlement invariants:
//!
//! 1. A task is funded exactly once - `escrow_tx_hash` never regresses
//! 2. `agent_payout + platform_fee == budget` to the micro-USDC
//! 3. No payout without an approval or a dispute resolution
//! 4. Failure is explicit - every rejected operation carries a stable code

pub mod agent;
pub mod amount;
pub mod bid;
pub mod caller;
pub mod dispute;
pub mod error;
pub mod event;
pub mod identity;
pub mod permit;
pub mod task;
pub mod transaction;

pub use agent::*;
pub use amount::*;
pub use bid::*;
pub use caller::*;
pub use dispute::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use permit::*;
pub use task::*;
pub use transaction::*;

/// Version of the OpenWork types schema
pub const TYPES_VERSION: &str = "0.1.0";
