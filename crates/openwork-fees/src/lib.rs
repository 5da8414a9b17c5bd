//! OpenWork Fee Engine
//!
//! Pure, deterministic split of a task budget into agent payout and
//! platform fee. No network, no database, no side effects.
//!
//! The fee is computed first and the payout is the remainder - never the
//! reverse - so integer truncation can never leave a residual uncollected
//! fee. Invariant: `agent_payout + platform_fee == budget` exact in
//! micro-USDC.

use openwork_types::{Usdc, WorkError, WorkResult};
use serde::{Deserialize, Serialize};

/// Platform fee in basis points for the reference deployment (8%)
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 800;

/// Maximum task budget accepted by the platform
pub const DEFAULT_MAX_BUDGET: Usdc = Usdc(10_000 * 1_000_000);

/// Result of a fee split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// What the agent receives
    pub agent_payout: Usdc,
    /// What the platform keeps
    pub platform_fee: Usdc,
}

/// Fee schedule for the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Platform fee in basis points (100 bps = 1%)
    pub platform_fee_bps: u32,
    /// Budget cap enforced at task creation
    pub max_budget: Usdc,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            max_budget: DEFAULT_MAX_BUDGET,
        }
    }
}

impl FeeSchedule {
    pub fn new(platform_fee_bps: u32, max_budget: Usdc) -> Self {
        Self {
            platform_fee_bps,
            max_budget,
        }
    }

    /// Validate a budget against platform bounds
    pub fn check_budget(&self, budget: Usdc) -> WorkResult<()> {
        if !budget.is_positive() || budget > self.max_budget {
            return Err(WorkError::BudgetOutOfRange {
                requested: budget.to_human(),
                max: self.max_budget.to_human(),
            });
        }
        Ok(())
    }

    /// Split a budget into agent payout and platform fee
    ///
    /// Fee first, payout as the remainder.
    pub fn split(&self, budget: Usdc) -> WorkResult<FeeBreakdown> {
        self.check_budget(budget)?;

        let platform_fee = budget.basis_points(self.platform_fee_bps)?;
        let agent_payout = budget.checked_sub(platform_fee)?;

        Ok(FeeBreakdown {
            agent_payout,
            platform_fee,
        })
    }
}
