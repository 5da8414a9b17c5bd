//! Escrow gateway
//!
//! Issues permit-signing challenges and relays signed permits; signs
//! release and refund movements with the custody wallet. Every entry
//! point refuses with `CustodyNotConfigured` when the custody signer is
//! absent rather than attempting a doomed chain call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use openwork_types::{
    default_deadline, PermitChallenge, PermitDomain, PermitMessage, PermitSignature, TxHash, Usdc,
    WalletAddress, WorkError, WorkResult,
};

use crate::chain::ChainClient;

/// Custody signer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Platform custody wallet holding escrowed funds and paying gas
    pub custody_address: WalletAddress,
    /// Where platform fees are swept
    pub treasury_address: WalletAddress,
    /// The stablecoin token contract
    pub token_address: WalletAddress,
    /// L2 chain id
    pub chain_id: u64,
    /// Token EIP-712 domain name
    pub token_name: String,
    /// Token EIP-712 domain version
    pub token_version: String,
}

/// Result of a successful funding relay: two chain operations, two hashes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingReceipt {
    /// The permit submission
    pub permit_tx_hash: TxHash,
    /// The subsequent transfer into custody
    pub transfer_tx_hash: TxHash,
}

/// Result of a successful release: payout plus fee sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    pub payout_tx_hash: TxHash,
    /// Absent when the fee was zero
    pub fee_tx_hash: Option<TxHash>,
}

/// The escrow gateway
#[derive(Clone)]
pub struct EscrowGateway {
    chain: Arc<dyn ChainClient>,
    custody: Option<CustodyConfig>,
}

impl EscrowGateway {
    pub fn new(chain: Arc<dyn ChainClient>, custody: Option<CustodyConfig>) -> Self {
        Self { chain, custody }
    }

    /// Whether the custody signer is configured
    pub fn is_configured(&self) -> bool {
        self.custody.is_some()
    }

    fn custody(&self) -> WorkResult<&CustodyConfig> {
        self.custody.as_ref().ok_or(WorkError::CustodyNotConfigured)
    }

    /// Phase 1: construct the typed message for the funder to sign
    ///
    /// Looks up the funder's current on-chain nonce; RPC failure surfaces
    /// as a retryable `ChainUnavailable`, never as a validation error.
    pub async fn issue_challenge(
        &self,
        owner: &WalletAddress,
        amount: Usdc,
    ) -> WorkResult<PermitChallenge> {
        let custody = self.custody()?;
        let nonce = self.chain.permit_nonce(owner).await?;
        let deadline = default_deadline();

        Ok(PermitChallenge {
            domain: PermitDomain {
                name: custody.token_name.clone(),
                version: custody.token_version.clone(),
                chain_id: custody.chain_id,
                verifying_contract: custody.token_address.clone(),
            },
            message: PermitMessage {
                owner: owner.clone(),
                spender: custody.custody_address.clone(),
                value: amount.micros(),
                nonce,
                deadline: deadline.timestamp(),
            },
            amount,
            deadline,
            instructions: format!(
                "Sign this EIP-712 permit authorizing {} to escrow {} on your behalf. \
                 The platform submits the transaction and pays the gas. \
                 Valid until {}.",
                custody.custody_address, amount, deadline
            ),
        })
    }

    /// Phase 2: relay a signed permit, then pull the funds into custody
    ///
    /// Expiry is checked before any chain call so a stale signature fails
    /// deterministically and distinctly from an on-chain rejection.
    pub async fn fund(
        &self,
        owner: &WalletAddress,
        amount: Usdc,
        signature: &PermitSignature,
    ) -> WorkResult<FundingReceipt> {
        let custody = self.custody()?;

        if signature.is_expired() {
            return Err(WorkError::PermitExpired {
                deadline: signature.deadline.to_rfc3339(),
            });
        }

        let nonce = self.chain.permit_nonce(owner).await?;
        let message = PermitMessage {
            owner: owner.clone(),
            spender: custody.custody_address.clone(),
            value: amount.micros(),
            nonce,
            deadline: signature.deadline.timestamp(),
        };

        let permit_tx_hash = self.chain.submit_permit(&message, signature).await?;
        let transfer_tx_hash = self.chain.pull_to_custody(owner, amount).await?;

        info!(owner = %owner, %amount, permit_tx = %permit_tx_hash, transfer_tx = %transfer_tx_hash,
              "escrow funded");
        Ok(FundingReceipt {
            permit_tx_hash,
            transfer_tx_hash,
        })
    }

    /// Release escrowed funds: payout to the worker, fee to the treasury
    ///
    /// Custody signs autonomously; no interactive signature step exists.
    pub async fn release(
        &self,
        to: &WalletAddress,
        payout: Usdc,
        fee: Usdc,
    ) -> WorkResult<ReleaseReceipt> {
        let custody = self.custody()?;

        let payout_tx_hash = self.chain.pay_out(to, payout).await?;

        // The payout already left custody; a failed fee sweep is logged and
        // left to reconciliation rather than unwinding the payout.
        let fee_tx_hash = if fee.is_positive() {
            match self.chain.pay_out(&custody.treasury_address, fee).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!(%fee, error = %e, "fee sweep failed after payout");
                    None
                }
            }
        } else {
            None
        };

        info!(to = %to, %payout, %fee, payout_tx = %payout_tx_hash, "escrow released");
        Ok(ReleaseReceipt {
            payout_tx_hash,
            fee_tx_hash,
        })
    }

    /// Refund escrowed funds to the poster's wallet
    pub async fn refund(&self, to: &WalletAddress, amount: Usdc) -> WorkResult<TxHash> {
        self.custody()?;
        let hash = self.chain.pay_out(to, amount).await?;
        info!(to = %to, %amount, tx = %hash, "escrow refunded");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;
    use chrono::{Duration, Utc};

    fn custody_config() -> CustodyConfig {
        CustodyConfig {
            custody_address: WalletAddress::new("0xcustody"),
            treasury_address: WalletAddress::new("0xtreasury"),
            token_address: WalletAddress::new("0xusdc"),
            chain_id: 8453,
            token_name: "USD Coin".to_string(),
            token_version: "2".to_string(),
        }
    }

    fn gateway(chain: Arc<MockChain>) -> EscrowGateway {
        EscrowGateway::new(chain, Some(custody_config()))
    }

    fn live_signature() -> PermitSignature {
        PermitSignature {
            v: 27,
            r: "0x01".to_string(),
            s: "0x02".to_string(),
            deadline: default_deadline(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_refuses_everything() {
        let gateway = EscrowGateway::new(Arc::new(MockChain::new()), None);
        let owner = WalletAddress::new("0xowner");
        assert!(!gateway.is_configured());

        assert!(matches!(
            gateway.issue_challenge(&owner, Usdc::from_human(10.0)).await,
            Err(WorkError::CustodyNotConfigured)
        ));
        assert!(matches!(
            gateway
                .fund(&owner, Usdc::from_human(10.0), &live_signature())
                .await,
            Err(WorkError::CustodyNotConfigured)
        ));
        assert!(matches!(
            gateway
                .release(&owner, Usdc::from_human(9.2), Usdc::from_human(0.8))
                .await,
            Err(WorkError::CustodyNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_challenge_encodes_exact_micros() {
        let chain = Arc::new(MockChain::new());
        let gateway = gateway(chain);
        let owner = WalletAddress::new("0xowner");

        let challenge = gateway
            .issue_challenge(&owner, Usdc::from_human(10.0))
            .await
            .unwrap();

        assert_eq!(challenge.message.value, 10_000_000);
        assert_eq!(challenge.message.spender, WalletAddress::new("0xcustody"));
        assert_eq!(challenge.message.nonce, 0);
        assert!(!challenge.is_expired());
    }

    #[tokio::test]
    async fn test_challenge_surfaces_rpc_outage_as_retryable() {
        let chain = Arc::new(MockChain::new());
        chain.set_unavailable(true).await;
        let gateway = gateway(chain);

        let err = gateway
            .issue_challenge(&WalletAddress::new("0xowner"), Usdc::from_human(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkError::ChainUnavailable { .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_fund_returns_two_distinct_hashes() {
        let chain = Arc::new(MockChain::new());
        let gateway = gateway(chain.clone());
        let owner = WalletAddress::new("0xowner");

        let receipt = gateway
            .fund(&owner, Usdc::from_human(10.0), &live_signature())
            .await
            .unwrap();

        assert_ne!(receipt.permit_tx_hash, receipt.transfer_tx_hash);
        assert_eq!(chain.submitted_count().await, 2);
    }

    #[tokio::test]
    async fn test_expired_permit_fails_before_any_chain_call() {
        let chain = Arc::new(MockChain::new());
        let gateway = gateway(chain.clone());
        let owner = WalletAddress::new("0xowner");

        let stale = PermitSignature {
            deadline: Utc::now() - Duration::minutes(1),
            ..live_signature()
        };

        assert!(matches!(
            gateway.fund(&owner, Usdc::from_human(10.0), &stale).await,
            Err(WorkError::PermitExpired { .. })
        ));
        assert_eq!(chain.submitted_count().await, 0);
    }

    #[tokio::test]
    async fn test_release_pays_worker_and_sweeps_fee() {
        let chain = Arc::new(MockChain::new());
        let gateway = gateway(chain.clone());

        let receipt = gateway
            .release(
                &WalletAddress::new("0xworker"),
                Usdc::from_human(9.20),
                Usdc::from_human(0.80),
            )
            .await
            .unwrap();

        assert!(receipt.fee_tx_hash.is_some());
        assert_eq!(chain.submitted_count().await, 2);
    }

    #[tokio::test]
    async fn test_zero_fee_skips_sweep() {
        let chain = Arc::new(MockChain::new());
        let gateway = gateway(chain.clone());

        let receipt = gateway
            .release(&WalletAddress::new("0xworker"), Usdc::from_human(5.0), Usdc::ZERO)
            .await
            .unwrap();

        assert!(receipt.fee_tx_hash.is_none());
        assert_eq!(chain.submitted_count().await, 1);
    }
}
