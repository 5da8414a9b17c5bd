//! Gasless permit types (EIP-2612-style)
//!
//! A permit is an off-chain signed authorization letting the platform
//! submit the funding transaction and pay its gas on the signer's behalf.
//! The signature itself is transient input - consumed exactly once per
//! funding operation and never persisted.

use crate::{Usdc, WalletAddress};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default validity window for a funding challenge
pub const PERMIT_VALIDITY_HOURS: i64 = 1;

/// EIP-712 domain the permit message is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitDomain {
    /// Token name (e.g. "USD Coin")
    pub name: String,
    /// Token version string
    pub version: String,
    /// L2 chain id
    pub chain_id: u64,
    /// Token contract address
    pub verifying_contract: WalletAddress,
}

/// The typed message the funder signs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitMessage {
    /// Funding wallet
    pub owner: WalletAddress,
    /// Platform custody address authorized to pull the funds
    pub spender: WalletAddress,
    /// Exact amount in the token's smallest unit (micros)
    pub value: i64,
    /// Owner's current on-chain permit nonce
    pub nonce: u64,
    /// Unix timestamp after which the permit is invalid
    pub deadline: i64,
}

/// Challenge returned to the funder: sign this, send back {v, r, s}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitChallenge {
    pub domain: PermitDomain,
    pub message: PermitMessage,
    /// The amount as USDC, for display
    pub amount: Usdc,
    /// When the challenge expires
    pub deadline: DateTime<Utc>,
    /// Human-readable signing instructions
    pub instructions: String,
}

impl PermitChallenge {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.deadline
    }
}

/// The signature components relayed back by the funder
///
/// Transient: consumed exactly once, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitSignature {
    pub v: u8,
    pub r: String,
    pub s: String,
    /// Deadline the signature covers, echoed back from the challenge
    pub deadline: DateTime<Utc>,
}

impl PermitSignature {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.deadline
    }
}

/// Convenience for building a deadline the standard window out
pub fn default_deadline() -> DateTime<Utc> {
    Utc::now() + Duration::hours(PERMIT_VALIDITY_HOURS)
}
