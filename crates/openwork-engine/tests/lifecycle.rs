//! End-to-end lifecycle tests against an in-memory chain

use std::sync::Arc;

use openwork_engine::{CreateTaskRequest, InlinePermit, TaskEngine};
use openwork_escrow::{CustodyConfig, EscrowGateway, MockChain};
use openwork_fees::FeeSchedule;
use openwork_store::MarketStore;
use openwork_types::{
    default_deadline, Agent, Caller, DisputeResolution, HumanId, LedgerTxStatus, PermitSignature,
    TaskEvent, TaskStatus, Usdc, WalletAddress, WorkError,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

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

fn signature() -> PermitSignature {
    PermitSignature {
        v: 27,
        r: "0x01".to_string(),
        s: "0x02".to_string(),
        deadline: default_deadline(),
    }
}

fn permit() -> InlinePermit {
    InlinePermit {
        owner: WalletAddress::new("0xposter"),
        signature: signature(),
    }
}

struct Harness {
    engine: TaskEngine,
    chain: Arc<MockChain>,
    events: UnboundedReceiver<TaskEvent>,
    poster: Caller,
    agent: Agent,
}

async fn harness() -> Harness {
    harness_with(|agent| {
        agent.wallet = Some(WalletAddress::new("0xworker"));
    })
    .await
}

async fn harness_with(customize: impl FnOnce(&mut Agent)) -> Harness {
    let store = MarketStore::new();
    let chain = Arc::new(MockChain::new());
    let gateway = EscrowGateway::new(chain.clone(), Some(custody_config()));
    let (engine, events) = TaskEngine::new(store.clone(), FeeSchedule::default(), gateway);

    let mut agent = Agent::new("scribe");
    customize(&mut agent);
    store.insert_agent(agent.clone()).await;

    Harness {
        engine,
        chain,
        events,
        poster: Caller::Human(HumanId::new()),
        agent,
    }
}

fn request(h: &Harness) -> CreateTaskRequest {
    CreateTaskRequest {
        agent_id: h.agent.id.clone(),
        title: "Ink portrait".to_string(),
        description: "A4 ink portrait from the attached photo".to_string(),
        required_skills: vec!["illustration".to_string()],
        budget: Usdc::from_human(10.00),
        task_inputs: None,
        permit: None,
    }
}

fn drain_events(events: &mut UnboundedReceiver<TaskEvent>) -> Vec<&'static str> {
    let mut names = vec![];
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    names
}

#[tokio::test]
async fn test_happy_path_create_fund_deliver_approve() {
    let mut h = harness().await;

    let created = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                permit: Some(permit()),
                ..request(&h)
            },
        )
        .await
        .unwrap();
    assert_eq!(created.status, TaskStatus::InProgress);
    assert!(created.escrow_funded);
    assert!(created.funding_error.is_none());

    let task = h.engine.store().task(&created.task_id).await.unwrap();
    assert!(task.is_funded());
    assert_eq!(task.bid_count, 1);

    let worker = Caller::Agent(h.agent.id.clone());
    h.engine
        .deliver(&created.task_id, &worker, json!({ "image_url": "ipfs://cat" }))
        .await
        .unwrap();

    let approval = h.engine.approve(&created.task_id, &h.poster).await.unwrap();
    assert_eq!(approval.status, TaskStatus::Completed);
    assert_eq!(approval.agent_payout, Usdc::from_human(9.20));
    assert_eq!(approval.platform_fee, Usdc::from_human(0.80));
    assert!(approval.on_chain);
    assert!(approval.tx_hash.is_some());

    let task = h.engine.store().task(&created.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.completion_tx_hash, approval.tx_hash);

    let agent = h.engine.store().agent(&h.agent.id).await.unwrap();
    assert_eq!(agent.tasks_completed, 1);
    assert_eq!(agent.total_earned, Usdc::from_human(9.20));

    assert_eq!(
        drain_events(&mut h.events),
        vec![
            "task.created",
            "task.escrow_funded",
            "task.delivered",
            "task.approved"
        ]
    );
}

#[tokio::test]
async fn test_second_funding_attempt_conflicts() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap();

    let owner = WalletAddress::new("0xposter");
    let first = h
        .engine
        .fund_escrow(&created.task_id, &h.poster, &owner, &signature(), None)
        .await
        .unwrap();

    let second = h
        .engine
        .fund_escrow(&created.task_id, &h.poster, &owner, &signature(), None)
        .await;
    assert!(matches!(second, Err(WorkError::EscrowAlreadyFunded { .. })));

    // The original hash survives the rejected retry
    let task = h.engine.store().task(&created.task_id).await.unwrap();
    assert_eq!(task.escrow_tx_hash, Some(first.escrow_tx_hash));
}

#[tokio::test]
async fn test_declared_amount_must_match_budget() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap();

    let err = h
        .engine
        .fund_escrow(
            &created.task_id,
            &h.poster,
            &WalletAddress::new("0xposter"),
            &signature(),
            Some(Usdc::from_human(9.00)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::PermitAmountMismatch { .. }));
}

#[tokio::test]
async fn test_inline_funding_failure_does_not_fail_creation() {
    let h = harness().await;
    h.chain.set_unavailable(true).await;

    let created = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                permit: Some(permit()),
                ..request(&h)
            },
        )
        .await
        .unwrap();

    assert!(!created.escrow_funded);
    let error = created.funding_error.unwrap();
    assert!(error.starts_with("CHAIN_UNAVAILABLE"), "got: {}", error);

    // The task exists and can be funded again once the chain recovers
    h.chain.set_unavailable(false).await;
    let task = h.engine.store().task(&created.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert!(!task.is_funded());
    h.engine
        .fund_escrow(
            &created.task_id,
            &h.poster,
            &WalletAddress::new("0xposter"),
            &signature(),
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_funding_challenge_is_poster_only() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap();

    let challenge = h
        .engine
        .funding_challenge(&created.task_id, &h.poster, &WalletAddress::new("0xposter"))
        .await
        .unwrap();
    assert_eq!(challenge.message.value, 10_000_000);

    let worker = Caller::Agent(h.agent.id.clone());
    let err = h
        .engine
        .funding_challenge(&created.task_id, &worker, &WalletAddress::new("0xposter"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::Forbidden { .. }));
}

#[tokio::test]
async fn test_approval_requires_review_status_and_poster() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap();

    // Nothing delivered yet
    let premature = h.engine.approve(&created.task_id, &h.poster).await;
    assert!(matches!(premature, Err(WorkError::InvalidStatus { .. })));

    let worker = Caller::Agent(h.agent.id.clone());
    h.engine
        .deliver(&created.task_id, &worker, json!({ "done": true }))
        .await
        .unwrap();

    // The worker cannot self-approve
    let self_approve = h.engine.approve(&created.task_id, &worker).await;
    assert!(matches!(self_approve, Err(WorkError::Forbidden { .. })));

    h.engine.approve(&created.task_id, &h.poster).await.unwrap();

    // Idempotent retry loses on the status recheck, no double payout
    let again = h.engine.approve(&created.task_id, &h.poster).await;
    assert!(matches!(again, Err(WorkError::InvalidStatus { .. })));
    let agent = h.engine.store().agent(&h.agent.id).await.unwrap();
    assert_eq!(agent.tasks_completed, 1);
}

#[tokio::test]
async fn test_only_assigned_agent_delivers() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap();

    let stranger = Caller::Agent(Agent::new("other").id);
    let err = h
        .engine
        .deliver(&created.task_id, &stranger, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::Forbidden { .. }));
}

#[tokio::test]
async fn test_walletless_agent_completes_with_pending_ledger_row() {
    let mut h = harness_with(|agent| {
        agent.wallet = None;
    })
    .await;

    let created = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                permit: Some(permit()),
                ..request(&h)
            },
        )
        .await
        .unwrap();

    let worker = Caller::Agent(h.agent.id.clone());
    h.engine
        .deliver(&created.task_id, &worker, json!({ "done": true }))
        .await
        .unwrap();

    let approval = h.engine.approve(&created.task_id, &h.poster).await.unwrap();
    assert_eq!(approval.status, TaskStatus::Completed);
    assert!(!approval.on_chain);
    assert!(approval.tx_hash.is_none());

    // Stats progress anyway; the discrepancy lives in the ledger
    let agent = h.engine.store().agent(&h.agent.id).await.unwrap();
    assert_eq!(agent.tasks_completed, 1);
    assert_eq!(agent.total_earned, Usdc::from_human(9.20));

    let rows = h
        .engine
        .store()
        .transactions_for_task(&created.task_id)
        .await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, LedgerTxStatus::Pending);
    assert_eq!(rows[0].amount, Usdc::from_human(9.20));

    let names = drain_events(&mut h.events);
    assert!(names.contains(&"task.approved"));
}

#[tokio::test]
async fn test_cancel_refunds_funded_escrow() {
    let mut h = harness().await;
    let created = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                permit: Some(permit()),
                ..request(&h)
            },
        )
        .await
        .unwrap();

    let cancelled = h.engine.cancel(&created.task_id, &h.poster).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.refunded);
    assert!(cancelled.refund_tx_hash.is_some());

    let names = drain_events(&mut h.events);
    assert!(names.contains(&"task.cancelled"));
}

#[tokio::test]
async fn test_cancel_refused_after_delivery() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap();

    let worker = Caller::Agent(h.agent.id.clone());
    h.engine
        .deliver(&created.task_id, &worker, json!({ "done": true }))
        .await
        .unwrap();

    let err = h.engine.cancel(&created.task_id, &h.poster).await.unwrap_err();
    assert!(matches!(err, WorkError::InvalidStatus { .. }));
}

#[tokio::test]
async fn test_dispute_freezes_then_partial_split_settles() {
    let mut h = harness().await;
    let created = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                permit: Some(permit()),
                ..request(&h)
            },
        )
        .await
        .unwrap();

    let worker = Caller::Agent(h.agent.id.clone());
    h.engine
        .deliver(&created.task_id, &worker, json!({ "image_url": "ipfs://dog" }))
        .await
        .unwrap();

    let dispute = h
        .engine
        .dispute(&created.task_id, &h.poster, "asked for a cat")
        .await
        .unwrap();
    let task = h.engine.store().task(&created.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Disputed);

    // Settlement frozen: approval refused while disputed
    assert!(matches!(
        h.engine.approve(&created.task_id, &h.poster).await,
        Err(WorkError::InvalidStatus { .. })
    ));

    // One open dispute at a time
    assert!(matches!(
        h.engine.dispute(&created.task_id, &worker, "counter").await,
        Err(WorkError::InvalidStatus { .. })
    ));

    let outcome = h
        .engine
        .settle_dispute(
            &dispute.id,
            &created.task_id,
            DisputeResolution::PartialSplit {
                refund_percentage: 40,
            },
        )
        .await
        .unwrap();

    // 40% of 10.00 back to the poster; the 6.00 remainder is fee-split
    assert_eq!(outcome.poster_refund, Usdc::from_human(4.00));
    assert_eq!(outcome.agent_payout, Usdc::from_human(5.52));
    assert!(outcome.payout_result.is_on_chain());
    assert!(outcome.refund_result.is_on_chain());

    let task = h.engine.store().task(&created.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    // Settling twice is refused
    assert!(matches!(
        h.engine
            .settle_dispute(&dispute.id, &created.task_id, DisputeResolution::FullRefund)
            .await,
        Err(WorkError::InvalidStatus { .. })
    ));

    let names = drain_events(&mut h.events);
    assert!(names.contains(&"task.disputed"));
    assert!(names.contains(&"task.dispute_resolved"));
}

#[tokio::test]
async fn test_full_refund_pays_no_one() {
    let h = harness().await;
    let created = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                permit: Some(permit()),
                ..request(&h)
            },
        )
        .await
        .unwrap();

    let worker = Caller::Agent(h.agent.id.clone());
    h.engine
        .deliver(&created.task_id, &worker, json!({}))
        .await
        .unwrap();
    let dispute = h
        .engine
        .dispute(&created.task_id, &worker, "poster unresponsive")
        .await
        .unwrap();

    let outcome = h
        .engine
        .settle_dispute(&dispute.id, &created.task_id, DisputeResolution::FullRefund)
        .await
        .unwrap();

    assert_eq!(outcome.poster_refund, Usdc::from_human(10.00));
    assert_eq!(outcome.agent_payout, Usdc::ZERO);
    assert!(outcome.refund_result.is_on_chain());
    assert!(!outcome.payout_result.is_on_chain());

    // No completion credit on a full refund
    let agent = h.engine.store().agent(&h.agent.id).await.unwrap();
    assert_eq!(agent.tasks_completed, 0);
    assert_eq!(agent.total_earned, Usdc::ZERO);
}

#[tokio::test]
async fn test_create_validates_inputs_against_agent_schema() {
    let h = harness_with(|agent| {
        agent.input_schema = Some(json!({ "required": ["prompt", "format"] }));
    })
    .await;

    let err = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                task_inputs: Some(json!({ "prompt": "a cat" })),
                ..request(&h)
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::InputSchemaMismatch { .. }));

    h.engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                task_inputs: Some(json!({ "prompt": "a cat", "format": "png" })),
                ..request(&h)
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_refuses_unavailable_agent() {
    let h = harness_with(|agent| {
        agent.status = openwork_types::AgentStatus::Draining;
    })
    .await;

    let err = h
        .engine
        .create_task(h.poster.clone(), request(&h))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::AgentUnavailable { .. }));
}

#[tokio::test]
async fn test_create_enforces_budget_bounds() {
    let h = harness().await;

    let err = h
        .engine
        .create_task(
            h.poster.clone(),
            CreateTaskRequest {
                budget: Usdc::from_human(10_001.0),
                ..request(&h)
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::BudgetOutOfRange { .. }));
}
