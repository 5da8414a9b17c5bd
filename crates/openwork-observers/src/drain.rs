//! Draining-agent completion

use tracing::{info, warn};

use openwork_store::MarketStore;
use openwork_types::{AgentStatus, TaskEvent};

/// Flips a draining agent to inactive once its last active task settles
///
/// Read-then-conditional-write, idempotent: re-running on an already
/// inactive agent is a no-op, and an agent with work still in flight is
/// left draining.
#[derive(Clone)]
pub struct DrainController {
    store: MarketStore,
}

impl DrainController {
    pub fn new(store: MarketStore) -> Self {
        Self { store }
    }

    pub async fn handle(&self, event: &TaskEvent) {
        let agent_id = match event {
            TaskEvent::Approved { agent_id, .. }
            | TaskEvent::DisputeResolved { agent_id, .. } => agent_id,
            TaskEvent::Cancelled {
                agent_id: Some(agent_id),
                ..
            } => agent_id,
            _ => return,
        };

        let agent = match self.store.agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "drain check skipped, agent lookup failed");
                return;
            }
        };
        if agent.status != AgentStatus::Draining {
            return;
        }

        let remaining = self.store.active_task_count(agent_id).await;
        if remaining > 0 {
            info!(agent = %agent_id, remaining, "agent still draining");
            return;
        }

        let result = self
            .store
            .update_agent(agent_id, |agent| {
                // Recheck under the lock: the operator may have resumed
                if agent.status == AgentStatus::Draining {
                    agent.status = AgentStatus::Inactive;
                }
                Ok(())
            })
            .await;
        match result {
            Ok(_) => info!(agent = %agent_id, "drain complete, agent now inactive"),
            Err(e) => warn!(agent = %agent_id, error = %e, "drain completion failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use openwork_types::{
        Agent, AgentId, Caller, HumanId, Task, TaskId, TaskStatus, Usdc,
    };

    fn active_task(agent_id: &AgentId) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(),
            status: TaskStatus::InProgress,
            poster: Caller::Human(HumanId::new()),
            assigned_agent: Some(agent_id.clone()),
            title: "t".to_string(),
            description: "d".to_string(),
            required_skills: vec![],
            budget: Usdc::from_human(10.0),
            escrow_tx_hash: None,
            funding_wallet: None,
            completion_tx_hash: None,
            task_inputs: None,
            deliverables: None,
            bid_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn approved(agent_id: &AgentId) -> TaskEvent {
        TaskEvent::Approved {
            task_id: TaskId::new(),
            poster: Caller::Human(HumanId::new()),
            agent_id: agent_id.clone(),
            agent_payout: Usdc::from_human(9.20),
            platform_fee: Usdc::from_human(0.80),
            on_chain: true,
        }
    }

    #[tokio::test]
    async fn test_last_settlement_completes_the_drain() {
        let store = MarketStore::new();
        let mut agent = Agent::new("scribe");
        agent.status = AgentStatus::Draining;
        store.insert_agent(agent.clone()).await;

        DrainController::new(store.clone())
            .handle(&approved(&agent.id))
            .await;

        let agent = store.agent(&agent.id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Inactive);
    }

    #[tokio::test]
    async fn test_drain_waits_for_remaining_work() {
        let store = MarketStore::new();
        let mut agent = Agent::new("scribe");
        agent.status = AgentStatus::Draining;
        store.insert_agent(agent.clone()).await;
        // One task still in flight
        store.insert_task(active_task(&agent.id)).await;

        DrainController::new(store.clone())
            .handle(&approved(&agent.id))
            .await;

        let agent = store.agent(&agent.id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Draining);
    }

    #[tokio::test]
    async fn test_active_agent_is_untouched() {
        let store = MarketStore::new();
        let agent = Agent::new("scribe");
        store.insert_agent(agent.clone()).await;

        DrainController::new(store.clone())
            .handle(&approved(&agent.id))
            .await;

        let agent = store.agent(&agent.id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_repeat_events_are_idempotent() {
        let store = MarketStore::new();
        let mut agent = Agent::new("scribe");
        agent.status = AgentStatus::Draining;
        store.insert_agent(agent.clone()).await;

        let controller = DrainController::new(store.clone());
        controller.handle(&approved(&agent.id)).await;
        controller.handle(&approved(&agent.id)).await;

        let agent = store.agent(&agent.id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Inactive);
    }
}
