//! Lifecycle notifications

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use openwork_store::{InboxMessage, MarketStore};
use openwork_types::{AgentId, Caller, TaskEvent, TaskId, WorkError, WorkResult};

/// A rendered notification ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Recipient id string (agent or human)
    pub recipient: String,
    /// Webhook endpoint, when the recipient has one registered
    #[serde(skip)]
    pub webhook_url: Option<String>,
    /// Stable event name (e.g. "task.approved")
    pub event: String,
    pub task_id: TaskId,
    /// Human-readable body
    pub body: String,
}

/// Delivery channel seam
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> WorkResult<()>;
}

/// Posts notifications to the recipient's registered webhook
///
/// Recipients without a webhook are silently skipped; this channel is
/// opt-in.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> WorkResult<()> {
        let Some(url) = &notification.webhook_url else {
            return Ok(());
        };
        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| WorkError::internal(format!("webhook post failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(WorkError::internal(format!(
                "webhook endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Appends notifications to the store-backed in-app inbox
pub struct InAppNotifier {
    store: MarketStore,
}

impl InAppNotifier {
    pub fn new(store: MarketStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for InAppNotifier {
    async fn deliver(&self, notification: &Notification) -> WorkResult<()> {
        self.store
            .push_inbox(InboxMessage {
                recipient: notification.recipient.clone(),
                event: notification.event.clone(),
                body: notification.body.clone(),
                created_at: Utc::now(),
            })
            .await;
        Ok(())
    }
}

/// Fans lifecycle events out to every registered channel
///
/// A failed delivery is logged and dropped; notifications are best-effort
/// by definition.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: MarketStore,
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(store: MarketStore, channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { store, channels }
    }

    pub async fn handle(&self, event: &TaskEvent) {
        for notification in self.render(event).await {
            for channel in &self.channels {
                if let Err(e) = channel.deliver(&notification).await {
                    warn!(recipient = %notification.recipient, event = %notification.event,
                          error = %e, "notification delivery failed, dropped");
                }
            }
        }
    }

    /// One notification per interested party
    async fn render(&self, event: &TaskEvent) -> Vec<Notification> {
        let task_id = event.task_id().clone();
        let name = event.name().to_string();
        let mut out = vec![];

        let mut push_agent = |out: &mut Vec<Notification>,
                              agent_id: &AgentId,
                              webhook: Option<String>,
                              body: String| {
            out.push(Notification {
                recipient: agent_id.to_string(),
                webhook_url: webhook,
                event: name.clone(),
                task_id: task_id.clone(),
                body,
            });
        };

        match event {
            TaskEvent::Created {
                agent_id, budget, ..
            } => {
                let webhook = self.agent_webhook(agent_id).await;
                push_agent(
                    &mut out,
                    agent_id,
                    webhook,
                    format!("You were hired for a new task ({})", budget),
                );
            }
            TaskEvent::EscrowFunded { agent_id, .. } => {
                let webhook = self.agent_webhook(agent_id).await;
                push_agent(
                    &mut out,
                    agent_id,
                    webhook,
                    "Escrow has been funded, payment is secured".to_string(),
                );
            }
            TaskEvent::Delivered { poster, .. } => {
                out.push(self.for_caller(poster, &name, &task_id,
                    "Deliverables submitted, awaiting your review".to_string()).await);
            }
            TaskEvent::Approved {
                poster,
                agent_id,
                agent_payout,
                on_chain,
                ..
            } => {
                let body = if *on_chain {
                    format!("Task approved, {} paid out", agent_payout)
                } else {
                    format!("Task approved, {} payout recorded as pending", agent_payout)
                };
                let webhook = self.agent_webhook(agent_id).await;
                push_agent(&mut out, agent_id, webhook, body);
                out.push(self.for_caller(poster, &name, &task_id,
                    "You approved the delivery, the task is complete".to_string()).await);
            }
            TaskEvent::Disputed {
                opened_by,
                agent_id,
                ..
            } => {
                let webhook = self.agent_webhook(agent_id).await;
                push_agent(
                    &mut out,
                    agent_id,
                    webhook,
                    format!("A dispute was opened by {}", opened_by.type_label()),
                );
            }
            TaskEvent::DisputeResolved {
                poster,
                agent_id,
                resolution,
                agent_payout,
                poster_refund,
                ..
            } => {
                let webhook = self.agent_webhook(agent_id).await;
                push_agent(
                    &mut out,
                    agent_id,
                    webhook,
                    format!("Dispute resolved ({}): you receive {}", resolution, agent_payout),
                );
                out.push(self.for_caller(poster, &name, &task_id,
                    format!("Dispute resolved ({}): you are refunded {}", resolution, poster_refund)).await);
            }
            TaskEvent::Cancelled {
                agent_id, refunded, ..
            } => {
                if let Some(agent_id) = agent_id {
                    let webhook = self.agent_webhook(agent_id).await;
                    let body = if *refunded {
                        "The task was cancelled and escrow refunded".to_string()
                    } else {
                        "The task was cancelled".to_string()
                    };
                    push_agent(&mut out, agent_id, webhook, body);
                }
            }
        }
        out
    }

    async fn for_caller(
        &self,
        caller: &Caller,
        event: &str,
        task_id: &TaskId,
        body: String,
    ) -> Notification {
        let webhook_url = match caller {
            Caller::Agent(id) => self.agent_webhook(id).await,
            Caller::Human(_) => None,
        };
        Notification {
            recipient: caller.id_string(),
            webhook_url,
            event: event.to_string(),
            task_id: task_id.clone(),
            body,
        }
    }

    async fn agent_webhook(&self, agent_id: &AgentId) -> Option<String> {
        self.store.agent(agent_id).await.ok()?.webhook_url
    }
}
