//! The task state machine

use chrono::Utc;
use tracing::{info, warn};

use openwork_escrow::EscrowGateway;
use openwork_fees::{FeeBreakdown, FeeSchedule};
use openwork_store::MarketStore;
use openwork_types::{
    Agent, Bid, Caller, Dispute, DisputeId, DisputeResolution, LedgerTransaction, LedgerTxStatus,
    LedgerTxType, PermitChallenge, PermitSignature, Task, TaskEvent, TaskId, TaskStatus, Usdc,
    WalletAddress, WorkError, WorkResult,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::requests::{
    ApprovalResponse, CancelResponse, CreateTaskRequest, CreateTaskResponse, FundResponse,
    PaymentResult, SettlementOutcome,
};

/// The task lifecycle engine
///
/// Each operation is a request-scoped unit of work. Money-safety checks
/// run inside store critical sections; everything else is published as a
/// `TaskEvent` for the observer consumers.
#[derive(Clone)]
pub struct TaskEngine {
    store: MarketStore,
    fees: FeeSchedule,
    gateway: EscrowGateway,
    events: UnboundedSender<TaskEvent>,
}

impl TaskEngine {
    /// Build the engine and hand back the outbound event queue
    pub fn new(
        store: MarketStore,
        fees: FeeSchedule,
        gateway: EscrowGateway,
    ) -> (Self, UnboundedReceiver<TaskEvent>) {
        let (events, receiver) = unbounded_channel();
        (
            Self {
                store,
                fees,
                gateway,
                events,
            },
            receiver,
        )
    }

    pub fn store(&self) -> &MarketStore {
        &self.store
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    fn publish(&self, event: TaskEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            warn!(event = name, "event queue closed; dropping event");
        }
    }

    // ========================================================================
    // Create (direct hire)
    // ========================================================================

    /// Create a direct-hire task
    ///
    /// The task is born `in_progress` with the agent assigned and a
    /// synthetic accepted bid as audit trail - `open` is skipped entirely.
    /// An inline permit funds escrow immediately; its failure is reported
    /// in the response but does not undo creation.
    pub async fn create_task(
        &self,
        poster: Caller,
        req: CreateTaskRequest,
    ) -> WorkResult<CreateTaskResponse> {
        let agent = self.store.agent(&req.agent_id).await?;
        if !agent.can_accept_work() {
            return Err(WorkError::AgentUnavailable {
                agent_id: agent.id.to_string(),
                status: agent.status.to_string(),
            });
        }

        if req.title.trim().is_empty() {
            return Err(WorkError::invalid_input("title", "must not be empty"));
        }
        if req.description.trim().is_empty() {
            return Err(WorkError::invalid_input("description", "must not be empty"));
        }
        self.fees.check_budget(req.budget)?;

        if let Some(schema) = &agent.input_schema {
            validate_task_inputs(schema, req.task_inputs.as_ref())?;
        }

        let now = Utc::now();
        let task = Task {
            id: TaskId::new(),
            status: TaskStatus::InProgress,
            poster: poster.clone(),
            assigned_agent: Some(agent.id.clone()),
            title: req.title,
            description: req.description,
            required_skills: req.required_skills,
            budget: req.budget,
            escrow_tx_hash: None,
            funding_wallet: None,
            completion_tx_hash: None,
            task_inputs: req.task_inputs,
            deliverables: None,
            bid_count: 1,
            created_at: now,
            updated_at: now,
        };
        let task_id = task.id.clone();

        self.store.insert_task(task).await;
        self.store
            .insert_bid(Bid::auto_accepted(
                task_id.clone(),
                agent.id.clone(),
                req.budget,
            ))
            .await;

        info!(task = %task_id, agent = %agent.id, budget = %req.budget, "direct-hire task created");
        self.publish(TaskEvent::Created {
            task_id: task_id.clone(),
            poster: poster.clone(),
            agent_id: agent.id.clone(),
            budget: req.budget,
        });

        let (escrow_funded, funding_error) = match req.permit {
            Some(permit) => {
                match self
                    .fund_escrow(&task_id, &poster, &permit.owner, &permit.signature, None)
                    .await
                {
                    Ok(_) => (true, None),
                    Err(e) => {
                        warn!(task = %task_id, error = %e, "inline escrow funding failed");
                        (false, Some(format!("{}: {}", e.error_code(), e)))
                    }
                }
            }
            None => (false, None),
        };

        Ok(CreateTaskResponse {
            task_id,
            status: TaskStatus::InProgress,
            assigned_agent: agent.id,
            escrow_funded,
            funding_error,
        })
    }

    // ========================================================================
    // Funding
    // ========================================================================

    /// Phase 1 of the gasless funding protocol: the signing challenge
    pub async fn funding_challenge(
        &self,
        task_id: &TaskId,
        caller: &Caller,
        owner: &WalletAddress,
    ) -> WorkResult<PermitChallenge> {
        let task = self.store.task(task_id).await?;

        if !task.is_poster(caller) {
            return Err(WorkError::forbidden("only the poster may fund escrow"));
        }
        if task.status != TaskStatus::InProgress {
            return Err(WorkError::InvalidStatus {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                operation: "request a funding challenge".to_string(),
            });
        }
        if task.is_funded() {
            return Err(WorkError::EscrowAlreadyFunded {
                task_id: task_id.to_string(),
            });
        }

        self.gateway.issue_challenge(owner, task.budget).await
    }

    /// Phase 2: relay the signed permit and record the escrow funding
    ///
    /// `declared_amount`, when the client echoes what it signed, must match
    /// the task budget exactly. Two concurrent calls serialize on the
    /// store's compare-and-swap: the loser observes the already-set hash
    /// and fails with a conflict.
    pub async fn fund_escrow(
        &self,
        task_id: &TaskId,
        caller: &Caller,
        owner: &WalletAddress,
        signature: &PermitSignature,
        declared_amount: Option<Usdc>,
    ) -> WorkResult<FundResponse> {
        let task = self.store.task(task_id).await?;

        if !task.is_poster(caller) {
            return Err(WorkError::forbidden("only the poster may fund escrow"));
        }
        if task.status != TaskStatus::InProgress {
            return Err(WorkError::InvalidStatus {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                operation: "fund escrow".to_string(),
            });
        }
        if task.is_funded() {
            return Err(WorkError::EscrowAlreadyFunded {
                task_id: task_id.to_string(),
            });
        }
        if let Some(declared) = declared_amount {
            if declared != task.budget {
                return Err(WorkError::PermitAmountMismatch {
                    expected: task.budget.to_human(),
                    got: declared.to_human(),
                });
            }
        }

        let receipt = self.gateway.fund(owner, task.budget, signature).await?;

        // The CAS is the authoritative serialization point; losing it after
        // a successful chain call is surfaced loudly for reconciliation.
        let task = match self
            .store
            .set_escrow_tx(task_id, receipt.transfer_tx_hash.clone(), owner.clone())
            .await
        {
            Ok(task) => task,
            Err(e) => {
                warn!(task = %task_id, tx = %receipt.transfer_tx_hash,
                      "funding confirmed on-chain but task was already funded; needs reconciliation");
                return Err(e);
            }
        };

        if let Some(agent_id) = task.assigned_agent.clone() {
            self.publish(TaskEvent::EscrowFunded {
                task_id: task_id.clone(),
                agent_id,
            });
        }

        Ok(FundResponse {
            escrow_tx_hash: receipt.transfer_tx_hash,
            permit_tx_hash: receipt.permit_tx_hash,
        })
    }

    // ========================================================================
    // Deliver
    // ========================================================================

    /// Submit deliverables, moving the task to review
    pub async fn deliver(
        &self,
        task_id: &TaskId,
        caller: &Caller,
        deliverables: serde_json::Value,
    ) -> WorkResult<Task> {
        let task = self
            .store
            .update_task(task_id, |task| {
                if task.status != TaskStatus::InProgress {
                    return Err(WorkError::InvalidStatus {
                        task_id: task.id.to_string(),
                        status: task.status.to_string(),
                        operation: "deliver".to_string(),
                    });
                }
                if !task.is_assigned_agent(caller) {
                    return Err(WorkError::forbidden(
                        "only the assigned agent may deliver",
                    ));
                }
                task.deliverables = Some(deliverables);
                task.status = TaskStatus::Review;
                Ok(())
            })
            .await?;

        info!(task = %task_id, "deliverables submitted");
        if let Some(agent_id) = task.assigned_agent.clone() {
            self.publish(TaskEvent::Delivered {
                task_id: task_id.clone(),
                poster: task.poster.clone(),
                agent_id,
            });
        }
        Ok(task)
    }

    // ========================================================================
    // Approve
    // ========================================================================

    /// Approve a delivered task
    ///
    /// The status transition commits first (so a concurrent approve loses
    /// on the status recheck and cannot double-pay), then the release is
    /// attempted best-effort.
    pub async fn approve(&self, task_id: &TaskId, caller: &Caller) -> WorkResult<ApprovalResponse> {
        let task = self
            .store
            .update_task(task_id, |task| {
                if task.status != TaskStatus::Review {
                    return Err(WorkError::InvalidStatus {
                        task_id: task.id.to_string(),
                        status: task.status.to_string(),
                        operation: "approve".to_string(),
                    });
                }
                if !task.is_poster(caller) {
                    return Err(WorkError::forbidden("only the poster may approve"));
                }
                task.status = TaskStatus::Completed;
                Ok(())
            })
            .await?;

        let agent_id = task
            .assigned_agent
            .clone()
            .ok_or_else(|| WorkError::internal("task in review without an assigned agent"))?;
        let agent = self.store.agent(&agent_id).await?;
        let split = self.fees.split(task.budget)?;

        let payout_result = self
            .attempt_release(&task, &agent, split.agent_payout, split.platform_fee)
            .await;

        let tx_hash = match &payout_result {
            PaymentResult::OnChain { tx_hash } => {
                let hash = tx_hash.clone();
                self.store
                    .update_task(task_id, |task| {
                        task.completion_tx_hash = Some(hash.clone());
                        Ok(())
                    })
                    .await?;
                Some(tx_hash.clone())
            }
            _ => None,
        };

        // Ledger-level stats progress even when the payment rail degraded;
        // the transaction row carries the discrepancy for reconciliation.
        self.store
            .update_agent(&agent_id, |agent| {
                agent.tasks_completed += 1;
                agent.total_earned = agent.total_earned.checked_add(split.agent_payout)?;
                Ok(())
            })
            .await?;

        let on_chain = payout_result.is_on_chain();
        info!(task = %task_id, agent = %agent_id, payout = %split.agent_payout,
              fee = %split.platform_fee, on_chain, "task approved");

        self.publish(TaskEvent::Approved {
            task_id: task_id.clone(),
            poster: task.poster.clone(),
            agent_id,
            agent_payout: split.agent_payout,
            platform_fee: split.platform_fee,
            on_chain,
        });

        Ok(ApprovalResponse {
            status: TaskStatus::Completed,
            agent_payout: split.agent_payout,
            platform_fee: split.platform_fee,
            on_chain,
            tx_hash,
        })
    }

    // ========================================================================
    // Dispute
    // ========================================================================

    /// Open a dispute, freezing settlement until resolution
    pub async fn dispute(
        &self,
        task_id: &TaskId,
        caller: &Caller,
        reason: impl Into<String>,
    ) -> WorkResult<Dispute> {
        let task = self
            .store
            .update_task(task_id, |task| {
                if !matches!(task.status, TaskStatus::InProgress | TaskStatus::Review) {
                    return Err(WorkError::InvalidStatus {
                        task_id: task.id.to_string(),
                        status: task.status.to_string(),
                        operation: "dispute".to_string(),
                    });
                }
                if !task.is_poster(caller) && !task.is_assigned_agent(caller) {
                    return Err(WorkError::forbidden(
                        "only the poster or the assigned agent may dispute",
                    ));
                }
                task.status = TaskStatus::Disputed;
                Ok(())
            })
            .await?;

        let dispute = self
            .store
            .open_dispute(Dispute::open(task_id.clone(), caller.clone(), reason))
            .await?;

        info!(task = %task_id, dispute = %dispute.id, "dispute opened; escrow frozen");
        if let Some(agent_id) = task.assigned_agent.clone() {
            self.publish(TaskEvent::Disputed {
                task_id: task_id.clone(),
                dispute_id: dispute.id.clone(),
                opened_by: caller.clone(),
                agent_id,
            });
        }
        Ok(dispute)
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    /// Cancel before work has meaningfully started
    ///
    /// Allowed only while the task is open or in progress with nothing
    /// delivered. Funded escrow is refunded, symmetric to release.
    pub async fn cancel(&self, task_id: &TaskId, caller: &Caller) -> WorkResult<CancelResponse> {
        let task = self
            .store
            .update_task(task_id, |task| {
                let cancellable = matches!(task.status, TaskStatus::Open | TaskStatus::InProgress)
                    && task.deliverables.is_none();
                if !cancellable {
                    return Err(WorkError::InvalidStatus {
                        task_id: task.id.to_string(),
                        status: task.status.to_string(),
                        operation: "cancel".to_string(),
                    });
                }
                if !task.is_poster(caller) {
                    return Err(WorkError::forbidden("only the poster may cancel"));
                }
                task.status = TaskStatus::Cancelled;
                Ok(())
            })
            .await?;

        let refund_result = self.attempt_refund(&task, task.budget).await;
        let (refunded, refund_tx_hash) = match &refund_result {
            PaymentResult::OnChain { tx_hash } => (true, Some(tx_hash.clone())),
            _ => (false, None),
        };

        info!(task = %task_id, refunded, "task cancelled");
        self.publish(TaskEvent::Cancelled {
            task_id: task_id.clone(),
            agent_id: task.assigned_agent.clone(),
            refunded,
        });

        Ok(CancelResponse {
            status: TaskStatus::Cancelled,
            refunded,
            refund_tx_hash,
        })
    }

    // ========================================================================
    // Dispute settlement (driven by the resolver)
    // ========================================================================

    /// Allocate escrowed funds per a dispute resolution and finish the task
    ///
    /// Refund is computed first on the raw budget; the payout side of a
    /// split runs through the normal fee-first schedule, so conservation
    /// holds in every resolution path.
    pub async fn settle_dispute(
        &self,
        dispute_id: &DisputeId,
        task_id: &TaskId,
        resolution: DisputeResolution,
    ) -> WorkResult<SettlementOutcome> {
        let task = self
            .store
            .update_task(task_id, |task| {
                if task.status != TaskStatus::Disputed {
                    return Err(WorkError::InvalidStatus {
                        task_id: task.id.to_string(),
                        status: task.status.to_string(),
                        operation: "settle a dispute".to_string(),
                    });
                }
                task.status = TaskStatus::Completed;
                Ok(())
            })
            .await?;

        let (poster_refund, split) = allocate(&self.fees, task.budget, resolution)?;
        let agent_id = task
            .assigned_agent
            .clone()
            .ok_or_else(|| WorkError::internal("disputed task without an assigned agent"))?;
        let agent = self.store.agent(&agent_id).await?;

        let refund_result = if poster_refund.is_positive() {
            self.attempt_refund(&task, poster_refund).await
        } else {
            PaymentResult::NotApplicable
        };

        let payout_result = if split.agent_payout.is_positive() {
            self.attempt_release(&task, &agent, split.agent_payout, split.platform_fee)
                .await
        } else {
            PaymentResult::NotApplicable
        };

        if split.agent_payout.is_positive() {
            self.store
                .update_agent(&agent_id, |agent| {
                    agent.tasks_completed += 1;
                    agent.total_earned = agent.total_earned.checked_add(split.agent_payout)?;
                    Ok(())
                })
                .await?;
        }

        info!(task = %task_id, dispute = %dispute_id, %resolution,
              refund = %poster_refund, payout = %split.agent_payout, "dispute settled");

        self.publish(TaskEvent::DisputeResolved {
            task_id: task_id.clone(),
            dispute_id: dispute_id.clone(),
            agent_id,
            poster: task.poster.clone(),
            resolution,
            agent_payout: split.agent_payout,
            poster_refund,
        });

        Ok(SettlementOutcome {
            resolution,
            agent_payout: split.agent_payout,
            poster_refund,
            payout_result,
            refund_result,
        })
    }

    // ========================================================================
    // Payment rails (best-effort, ledger-recorded on degradation)
    // ========================================================================

    async fn attempt_release(
        &self,
        task: &Task,
        agent: &Agent,
        payout: Usdc,
        fee: Usdc,
    ) -> PaymentResult {
        if !task.is_funded() {
            return self
                .record_degraded(
                    task,
                    LedgerTxType::EscrowRelease,
                    LedgerTxStatus::Pending,
                    payout,
                    "escrow was never funded".to_string(),
                )
                .await;
        }
        if !self.gateway.is_configured() {
            return self
                .record_degraded(
                    task,
                    LedgerTxType::EscrowRelease,
                    LedgerTxStatus::Pending,
                    payout,
                    "custody signer not configured".to_string(),
                )
                .await;
        }
        let wallet = match &agent.wallet {
            Some(wallet) => wallet.clone(),
            None => {
                return self
                    .record_degraded(
                        task,
                        LedgerTxType::EscrowRelease,
                        LedgerTxStatus::Pending,
                        payout,
                        "agent has no wallet on file".to_string(),
                    )
                    .await;
            }
        };

        match self.gateway.release(&wallet, payout, fee).await {
            Ok(receipt) => PaymentResult::OnChain {
                tx_hash: receipt.payout_tx_hash,
            },
            Err(e) => {
                let status = if e.is_retriable() {
                    LedgerTxStatus::Pending
                } else {
                    LedgerTxStatus::Failed
                };
                self.record_degraded(task, LedgerTxType::EscrowRelease, status, payout, e.to_string())
                    .await
            }
        }
    }

    async fn attempt_refund(&self, task: &Task, amount: Usdc) -> PaymentResult {
        if !task.is_funded() {
            return PaymentResult::NotApplicable;
        }
        let wallet = match &task.funding_wallet {
            Some(wallet) => wallet.clone(),
            None => {
                return self
                    .record_degraded(
                        task,
                        LedgerTxType::EscrowRefund,
                        LedgerTxStatus::Pending,
                        amount,
                        "funded task has no funding wallet recorded".to_string(),
                    )
                    .await;
            }
        };
        if !self.gateway.is_configured() {
            return self
                .record_degraded(
                    task,
                    LedgerTxType::EscrowRefund,
                    LedgerTxStatus::Pending,
                    amount,
                    "custody signer not configured".to_string(),
                )
                .await;
        }

        match self.gateway.refund(&wallet, amount).await {
            Ok(tx_hash) => PaymentResult::OnChain { tx_hash },
            Err(e) => {
                let status = if e.is_retriable() {
                    LedgerTxStatus::Pending
                } else {
                    LedgerTxStatus::Failed
                };
                self.record_degraded(task, LedgerTxType::EscrowRefund, status, amount, e.to_string())
                    .await
            }
        }
    }

    async fn record_degraded(
        &self,
        task: &Task,
        tx_type: LedgerTxType,
        status: LedgerTxStatus,
        amount: Usdc,
        reason: String,
    ) -> PaymentResult {
        warn!(task = %task.id, ?tx_type, ?status, %amount, %reason,
              "payment rail degraded; recorded for reconciliation");
        self.store
            .record_transaction(LedgerTransaction::new(
                task.id.clone(),
                tx_type,
                status,
                amount,
                None,
                reason.clone(),
            ))
            .await;
        PaymentResult::Recorded { reason }
    }
}

/// Compute the funds allocation for a resolution
fn allocate(
    fees: &FeeSchedule,
    budget: Usdc,
    resolution: DisputeResolution,
) -> WorkResult<(Usdc, FeeBreakdown)> {
    let zero = FeeBreakdown {
        agent_payout: Usdc::ZERO,
        platform_fee: Usdc::ZERO,
    };
    match resolution {
        DisputeResolution::FullRefund => Ok((budget, zero)),
        DisputeResolution::FullPayout => Ok((Usdc::ZERO, fees.split(budget)?)),
        DisputeResolution::PartialSplit { refund_percentage } => {
            if refund_percentage > 100 {
                return Err(WorkError::invalid_input(
                    "refund_percentage",
                    "must be between 0 and 100",
                ));
            }
            let refund = budget.percentage(refund_percentage)?;
            let remainder = budget.checked_sub(refund)?;
            let split = if remainder.is_positive() {
                fees.split(remainder)?
            } else {
                zero
            };
            Ok((refund, split))
        }
    }
}

/// Validate task inputs against the agent's declared schema
///
/// The schema is a JSON-schema-shaped object; only the `required` key list
/// is enforced at this boundary. A mismatch is a request error, not a
/// task-level failure.
fn validate_task_inputs(
    schema: &serde_json::Value,
    inputs: Option<&serde_json::Value>,
) -> WorkResult<()> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|keys| keys.iter().filter_map(|k| k.as_str()).collect())
        .unwrap_or_default();

    if required.is_empty() {
        return Ok(());
    }

    let object = inputs.and_then(|v| v.as_object());
    let missing: Vec<&str> = match object {
        Some(map) => required
            .into_iter()
            .filter(|key| !map.contains_key(*key))
            .collect(),
        None => required,
    };

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkError::InputSchemaMismatch {
            missing: missing.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_inputs_accepts_superset() {
        let schema = json!({ "required": ["prompt"] });
        let inputs = json!({ "prompt": "draw a cat", "style": "inked" });
        assert!(validate_task_inputs(&schema, Some(&inputs)).is_ok());
    }

    #[test]
    fn test_validate_inputs_reports_missing_keys() {
        let schema = json!({ "required": ["prompt", "format"] });
        let inputs = json!({ "prompt": "draw a cat" });
        let err = validate_task_inputs(&schema, Some(&inputs)).unwrap_err();
        assert!(matches!(err, WorkError::InputSchemaMismatch { ref missing } if missing == "format"));
    }

    #[test]
    fn test_validate_inputs_requires_object_when_schema_demands() {
        let schema = json!({ "required": ["prompt"] });
        assert!(validate_task_inputs(&schema, None).is_err());
    }

    #[test]
    fn test_validate_inputs_without_required_passes_anything() {
        let schema = json!({ "type": "object" });
        assert!(validate_task_inputs(&schema, None).is_ok());
    }

    #[test]
    fn test_allocation_conserves_budget() {
        let fees = FeeSchedule::default();
        let budget = Usdc::from_human(10.00);

        for resolution in [
            DisputeResolution::FullRefund,
            DisputeResolution::FullPayout,
            DisputeResolution::PartialSplit {
                refund_percentage: 40,
            },
            DisputeResolution::PartialSplit {
                refund_percentage: 0,
            },
            DisputeResolution::PartialSplit {
                refund_percentage: 100,
            },
        ] {
            let (refund, split) = allocate(&fees, budget, resolution).unwrap();
            let total = refund
                .checked_add(split.agent_payout)
                .unwrap()
                .checked_add(split.platform_fee)
                .unwrap();
            assert_eq!(total, budget, "allocation leaked funds for {}", resolution);
        }
    }

    #[test]
    fn test_allocation_rejects_over_100_percent() {
        let fees = FeeSchedule::default();
        assert!(allocate(
            &fees,
            Usdc::from_human(10.0),
            DisputeResolution::PartialSplit {
                refund_percentage: 101
            }
        )
        .is_err());
    }
}
