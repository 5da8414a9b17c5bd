//! The event consumer

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use openwork_store::MarketStore;
use openwork_types::TaskEvent;

use crate::drain::DrainController;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::reputation::{ReputationUpdater, TrustClient};

/// The full observer set, driven off the engine's event channel
#[derive(Clone)]
pub struct Observers {
    reputation: ReputationUpdater,
    drain: DrainController,
    notifications: NotificationDispatcher,
}

impl Observers {
    pub fn new(
        store: MarketStore,
        trust: Arc<dyn TrustClient>,
        channels: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            reputation: ReputationUpdater::new(store.clone(), trust),
            drain: DrainController::new(store.clone()),
            notifications: NotificationDispatcher::new(store, channels),
        }
    }

    /// Apply every observer to one event
    ///
    /// Each observer absorbs its own failures; none can abort the others.
    pub async fn handle(&self, event: &TaskEvent) {
        debug!(event = event.name(), task = %event.task_id(), "observer event");
        self.reputation.handle(event).await;
        self.drain.handle(event).await;
        self.notifications.handle(event).await;
    }

    /// Drain the channel until the engine side is dropped
    pub fn spawn(self, mut events: UnboundedReceiver<TaskEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(&event).await;
            }
            info!("event channel closed, observer consumer stopping");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use openwork_types::{
        Agent, AgentStatus, Caller, HumanId, TaskId, Usdc, WalletAddress, WorkResult,
    };
    use tokio::sync::mpsc::unbounded_channel;

    struct NullTrust;

    #[async_trait]
    impl TrustClient for NullTrust {
        async fn record(
            &self,
            _wallet: &WalletAddress,
            _event: crate::TrustEvent,
        ) -> WorkResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_consumer_drains_until_sender_drops() {
        let store = MarketStore::new();
        let mut agent = Agent::new("scribe");
        agent.status = AgentStatus::Draining;
        store.insert_agent(agent.clone()).await;

        let observers = Observers::new(store.clone(), Arc::new(NullTrust), vec![]);
        let (tx, rx) = unbounded_channel();
        let handle = observers.spawn(rx);

        tx.send(TaskEvent::Approved {
            task_id: TaskId::new(),
            poster: Caller::Human(HumanId::new()),
            agent_id: agent.id.clone(),
            agent_payout: Usdc::from_human(9.20),
            platform_fee: Usdc::from_human(0.80),
            on_chain: true,
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        // The drain observer ran as part of the consumed event
        let agent = store.agent(&agent.id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Inactive);
    }
}
