//! Dispute resolution orchestration

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use openwork_engine::{SettlementOutcome, TaskEngine};
use openwork_store::MarketStore;
use openwork_types::{
    Caller, Dispute, DisputeId, DisputeResolution, WorkError, WorkResult,
};

use crate::judge::DisputeJudge;

/// Actor identity recorded when the judge's verdict is applied
const JUDGE_ACTOR: &str = "openwork-judge";
/// Actor identity recorded when the deterministic fallback fires
const FALLBACK_ACTOR: &str = "openwork-judge-fallback";
/// Actor identity recorded for shared-secret admin resolutions
const ADMIN_ACTOR: &str = "openwork-admin";

/// Audit notes are capped so a rambling model cannot bloat the store
const MAX_NOTE_LEN: usize = 500;

/// Who is asking for the resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAuth {
    /// Operator tooling presenting the shared admin secret
    SharedSecret,
    /// An authenticated platform actor without the admin secret
    Actor(Caller),
}

/// What the resolution did, for the API response
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOutcome {
    pub dispute: Dispute,
    pub settlement: SettlementOutcome,
}

/// Drives a dispute to resolution
///
/// Resolution is exactly-once: the task's `Disputed -> Completed`
/// transition serializes concurrent attempts and the dispute record is
/// closed afterwards, so a retry observes the conflict instead of paying
/// twice.
#[derive(Clone)]
pub struct DisputeResolver {
    store: MarketStore,
    engine: TaskEngine,
    judge: Arc<dyn DisputeJudge>,
}

impl DisputeResolver {
    pub fn new(store: MarketStore, engine: TaskEngine, judge: Arc<dyn DisputeJudge>) -> Self {
        Self {
            store,
            engine,
            judge,
        }
    }

    /// Resolve a dispute, by explicit admin decision or by the judge
    ///
    /// A judge failure never leaves the dispute open: the outcome degrades
    /// to a full refund and the failure message is preserved in the audit
    /// note.
    pub async fn resolve(
        &self,
        dispute_id: &DisputeId,
        auth: AdminAuth,
        explicit: Option<DisputeResolution>,
    ) -> WorkResult<ResolveOutcome> {
        let dispute = self.store.dispute(dispute_id).await?;
        if dispute.is_resolved() {
            return Err(WorkError::DisputeAlreadyResolved {
                dispute_id: dispute_id.to_string(),
            });
        }

        let actor_label = match &auth {
            AdminAuth::SharedSecret => ADMIN_ACTOR.to_string(),
            AdminAuth::Actor(caller) => {
                // Allowed, but auditable: this path exists for operator
                // break-glass, not routine use.
                warn!(dispute = %dispute_id, caller = %caller,
                      "dispute resolution by non-admin actor");
                caller.id_string()
            }
        };

        let (resolution, note, resolved_by) = match explicit {
            Some(resolution) => (resolution, None, actor_label),
            None => self.adjudicate(&dispute).await,
        };

        let settlement = self
            .engine
            .settle_dispute(dispute_id, &dispute.task_id, resolution)
            .await?;

        let dispute = self
            .store
            .update_dispute(dispute_id, |d| {
                if d.is_resolved() {
                    return Err(WorkError::DisputeAlreadyResolved {
                        dispute_id: d.id.to_string(),
                    });
                }
                d.status = openwork_types::DisputeStatus::Resolved;
                d.resolution = Some(resolution);
                d.note = note.clone();
                d.resolved_by = Some(resolved_by.clone());
                d.resolved_at = Some(Utc::now());
                Ok(())
            })
            .await?;

        info!(dispute = %dispute_id, task = %dispute.task_id, %resolution,
              resolved_by = %resolved_by, "dispute resolved");

        Ok(ResolveOutcome {
            dispute,
            settlement,
        })
    }

    /// Run the judge; degrade to the deterministic fallback on any failure
    async fn adjudicate(
        &self,
        dispute: &Dispute,
    ) -> (DisputeResolution, Option<String>, String) {
        let verdict = async {
            let task = self.store.task(&dispute.task_id).await?;
            let agent_id = task
                .assigned_agent
                .clone()
                .ok_or_else(|| WorkError::internal("disputed task without an assigned agent"))?;
            let agent = self.store.agent(&agent_id).await?;
            self.judge.evaluate(&task, &agent).await
        }
        .await;

        match verdict {
            Ok(verdict) => (
                verdict.recommendation,
                Some(truncate(&verdict.reasoning)),
                JUDGE_ACTOR.to_string(),
            ),
            Err(e) => {
                warn!(dispute = %dispute.id, error = %e,
                      "judge failed; falling back to full refund");
                (
                    DisputeResolution::FullRefund,
                    Some(truncate(&format!("judge failed: {}", e))),
                    FALLBACK_ACTOR.to_string(),
                )
            }
        }
    }
}

fn truncate(note: &str) -> String {
    if note.len() <= MAX_NOTE_LEN {
        return note.to_string();
    }
    let mut cut = MAX_NOTE_LEN;
    while !note.is_char_boundary(cut) {
        cut -= 1;
    }
    note[..cut].to_string()
}
