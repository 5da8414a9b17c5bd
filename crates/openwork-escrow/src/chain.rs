//! Chain client seam
//!
//! The gateway talks to the settlement chain through this trait so tests
//! and local deployments can run against an in-memory chain.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use openwork_types::{
    PermitMessage, PermitSignature, TxHash, Usdc, WalletAddress, WorkError, WorkResult,
};

/// Client for the settlement chain
///
/// RPC unavailability surfaces as `ChainUnavailable` (retryable);
/// on-chain rejection (bad signature, insufficient balance) surfaces as
/// `ChainRejected`. The two are never conflated.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Current permit nonce of a wallet
    async fn permit_nonce(&self, owner: &WalletAddress) -> WorkResult<u64>;

    /// Submit a signed permit; the platform pays the gas
    async fn submit_permit(
        &self,
        message: &PermitMessage,
        signature: &PermitSignature,
    ) -> WorkResult<TxHash>;

    /// Pull permitted funds from the owner into custody
    async fn pull_to_custody(&self, owner: &WalletAddress, amount: Usdc) -> WorkResult<TxHash>;

    /// Pay funds out of custody to a wallet
    async fn pay_out(&self, to: &WalletAddress, amount: Usdc) -> WorkResult<TxHash>;
}

fn fake_tx_hash() -> TxHash {
    TxHash::new(format!("0x{}", Uuid::new_v4().simple()))
}

/// In-memory chain for tests and local runs
///
/// Nonces increment on permit submission; failure toggles simulate RPC
/// outage and on-chain rejection.
#[derive(Default)]
pub struct MockChain {
    nonces: Arc<RwLock<HashMap<WalletAddress, u64>>>,
    submitted: Arc<RwLock<Vec<TxHash>>>,
    unavailable: Arc<RwLock<bool>>,
    rejecting: Arc<RwLock<bool>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate RPC outage
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Simulate on-chain rejection of every submission
    pub async fn set_rejecting(&self, rejecting: bool) {
        *self.rejecting.write().await = rejecting;
    }

    /// Number of transactions submitted so far
    pub async fn submitted_count(&self) -> usize {
        self.submitted.read().await.len()
    }

    async fn check_health(&self) -> WorkResult<()> {
        if *self.unavailable.read().await {
            return Err(WorkError::ChainUnavailable {
                message: "rpc endpoint unreachable".to_string(),
            });
        }
        if *self.rejecting.read().await {
            return Err(WorkError::ChainRejected {
                message: "execution reverted".to_string(),
            });
        }
        Ok(())
    }

    async fn record(&self) -> TxHash {
        let hash = fake_tx_hash();
        self.submitted.write().await.push(hash.clone());
        hash
    }
}

#[async_trait::async_trait]
impl ChainClient for MockChain {
    async fn permit_nonce(&self, owner: &WalletAddress) -> WorkResult<u64> {
        if *self.unavailable.read().await {
            return Err(WorkError::ChainUnavailable {
                message: "rpc endpoint unreachable".to_string(),
            });
        }
        Ok(*self.nonces.read().await.get(owner).unwrap_or(&0))
    }

    async fn submit_permit(
        &self,
        message: &PermitMessage,
        _signature: &PermitSignature,
    ) -> WorkResult<TxHash> {
        self.check_health().await?;
        *self
            .nonces
            .write()
            .await
            .entry(message.owner.clone())
            .or_insert(0) += 1;
        let hash = self.record().await;
        info!(owner = %message.owner, value = message.value, "permit submitted");
        Ok(hash)
    }

    async fn pull_to_custody(&self, owner: &WalletAddress, amount: Usdc) -> WorkResult<TxHash> {
        self.check_health().await?;
        let hash = self.record().await;
        info!(owner = %owner, %amount, "funds pulled to custody");
        Ok(hash)
    }

    async fn pay_out(&self, to: &WalletAddress, amount: Usdc) -> WorkResult<TxHash> {
        self.check_health().await?;
        let hash = self.record().await;
        info!(to = %to, %amount, "custody payout submitted");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openwork_types::default_deadline;

    fn sig() -> PermitSignature {
        PermitSignature {
            v: 27,
            r: "0x01".to_string(),
            s: "0x02".to_string(),
            deadline: default_deadline(),
        }
    }

    fn message(owner: &WalletAddress) -> PermitMessage {
        PermitMessage {
            owner: owner.clone(),
            spender: WalletAddress::new("0xcustody"),
            value: 10_000_000,
            nonce: 0,
            deadline: default_deadline().timestamp(),
        }
    }

    #[tokio::test]
    async fn test_nonce_increments_on_permit() {
        let chain = MockChain::new();
        let owner = WalletAddress::new("0xowner");

        assert_eq!(chain.permit_nonce(&owner).await.unwrap(), 0);
        chain.submit_permit(&message(&owner), &sig()).await.unwrap();
        assert_eq!(chain.permit_nonce(&owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outage_and_rejection_are_distinct() {
        let chain = MockChain::new();
        let owner = WalletAddress::new("0xowner");

        chain.set_unavailable(true).await;
        assert!(matches!(
            chain.permit_nonce(&owner).await,
            Err(WorkError::ChainUnavailable { .. })
        ));

        chain.set_unavailable(false).await;
        chain.set_rejecting(true).await;
        assert!(matches!(
            chain.submit_permit(&message(&owner), &sig()).await,
            Err(WorkError::ChainRejected { .. })
        ));
    }
}
