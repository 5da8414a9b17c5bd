//! Wallet-keyed reputation updates

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use openwork_store::MarketStore;
use openwork_types::{TaskEvent, Usdc, WalletAddress, WorkResult};

/// A settlement outcome worth reflecting in a wallet's trust graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustEvent {
    /// The wallet's owner completed paid work
    JobCompleted { amount: Usdc },
    /// The wallet's owner paid for completed work
    PaymentMade { amount: Usdc },
}

/// External trust/reputation service seam
#[async_trait]
pub trait TrustClient: Send + Sync {
    async fn record(&self, wallet: &WalletAddress, event: TrustEvent) -> WorkResult<()>;
}

/// Feeds approved settlements into the trust graph
///
/// Updates are keyed by wallet, not platform id, so reputation survives
/// re-registration. Failures are logged and dropped; reputation is never
/// load-bearing for settlement.
#[derive(Clone)]
pub struct ReputationUpdater {
    store: MarketStore,
    trust: Arc<dyn TrustClient>,
}

impl ReputationUpdater {
    pub fn new(store: MarketStore, trust: Arc<dyn TrustClient>) -> Self {
        Self { store, trust }
    }

    pub async fn handle(&self, event: &TaskEvent) {
        let TaskEvent::Approved {
            task_id,
            agent_id,
            agent_payout,
            ..
        } = event
        else {
            return;
        };

        let agent_wallet = match self.store.agent(agent_id).await {
            Ok(agent) => agent.wallet,
            Err(e) => {
                warn!(task = %task_id, error = %e, "reputation update skipped, agent lookup failed");
                return;
            }
        };
        let funding_wallet = match self.store.task(task_id).await {
            Ok(task) => task.funding_wallet,
            Err(e) => {
                warn!(task = %task_id, error = %e, "reputation update skipped, task lookup failed");
                return;
            }
        };

        if let Some(wallet) = &agent_wallet {
            self.record(
                wallet,
                TrustEvent::JobCompleted {
                    amount: *agent_payout,
                },
            )
            .await;
        }

        if let Some(wallet) = &funding_wallet {
            // A wallet paying itself earns no payer-side credit
            if agent_wallet.as_ref() == Some(wallet) {
                debug!(task = %task_id, wallet = %wallet,
                       "payer wallet equals payee wallet, payer credit skipped");
                return;
            }
            self.record(
                wallet,
                TrustEvent::PaymentMade {
                    amount: *agent_payout,
                },
            )
            .await;
        }
    }

    async fn record(&self, wallet: &WalletAddress, event: TrustEvent) {
        if let Err(e) = self.trust.record(wallet, event).await {
            warn!(wallet = %wallet, ?event, error = %e, "trust update failed, dropped");
        }
    }
}
