//! OpenWork Disputes - arbitration with a deterministic fallback
//!
//! An automated judge evaluates the deliverables against the task
//! description and the agent's declared portfolio style, and recommends a
//! funds allocation. The judge is advisory infrastructure, not a point of
//! failure: when it errors, times out or returns garbage, the dispute is
//! resolved as a full refund to the poster and the failure is preserved in
//! the audit note. A dispute is never left open because an upstream model
//! was down.

mod judge;
mod resolver;

pub use judge::{DisputeJudge, HttpJudge, JudgeConfig, ScriptedJudge};
pub use resolver::{AdminAuth, DisputeResolver, ResolveOutcome};
