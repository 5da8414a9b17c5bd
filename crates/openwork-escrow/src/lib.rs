//! OpenWork Escrow - gasless permit funding and custody-signed release
//!
//! Funding is a two-phase protocol modeled on EIP-2612 permits: the
//! gateway issues a typed signing challenge, the funder returns {v, r, s},
//! and the platform - not the funder - submits the transaction and pays
//! its gas. Release and refund follow the same success/failure contract
//! but the custody wallet signs autonomously, so the task engine treats
//! funding, release and refund uniformly.

pub mod chain;
pub mod gateway;

pub use chain::{ChainClient, MockChain};
pub use gateway::{CustodyConfig, EscrowGateway, FundingReceipt, ReleaseReceipt};
