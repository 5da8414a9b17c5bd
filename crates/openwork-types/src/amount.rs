//! Micro-USDC amounts
//!
//! All settlement math happens in the token's smallest unit (10^-6 USDC,
//! "micros") using integer arithmetic, so fee splits are exact and the
//! conservation invariant `payout + fee == budget` holds without rounding
//! residue.

use crate::{WorkError, WorkResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimals in the USDC token
pub const USDC_DECIMALS: u32 = 6;

/// Micros per whole USDC
pub const MICROS_PER_USDC: i64 = 1_000_000;

/// A USDC amount in smallest units (micros)
///
/// Signed so ledger deltas can be expressed, but every operation that
/// accepts an external amount validates positivity at the boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Usdc(pub i64);

impl Usdc {
    /// Zero USDC
    pub const ZERO: Usdc = Usdc(0);

    /// Create from raw micros
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Create from a human-readable value (e.g. 10.00)
    pub fn from_human(value: f64) -> Self {
        Self((value * MICROS_PER_USDC as f64).round() as i64)
    }

    /// Raw value in micros
    pub fn micros(&self) -> i64 {
        self.0
    }

    /// Human-readable value
    pub fn to_human(&self) -> f64 {
        self.0 as f64 / MICROS_PER_USDC as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> WorkResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(WorkError::AmountOverflow)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> WorkResult<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(WorkError::AmountOverflow)
    }

    /// Multiply by basis points (100 bps = 1%), truncating toward zero
    pub fn basis_points(self, bps: u32) -> WorkResult<Self> {
        let scaled = (self.0 as i128)
            .checked_mul(bps as i128)
            .ok_or(WorkError::AmountOverflow)?
            / 10_000;
        i64::try_from(scaled)
            .map(Self)
            .map_err(|_| WorkError::AmountOverflow)
    }

    /// Multiply by a percentage (0-100), truncating toward zero
    pub fn percentage(self, percent: u8) -> WorkResult<Self> {
        self.basis_points(percent as u32 * 100)
    }
}

impl fmt::Display for Usdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} USDC", self.to_human())
    }
}
