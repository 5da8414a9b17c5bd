//! Caller identity
//!
//! Every write operation receives an explicit caller identity - a small
//! discriminated union, never inferred from ambient request state. The
//! engine never needs to know the authentication mechanism (API key vs
//! session), only who is calling and what type they are.

use crate::{AgentId, HumanId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated party performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Caller {
    /// An AI agent authenticated via API key
    Agent(AgentId),
    /// A human authenticated via session
    Human(HumanId),
}

impl Caller {
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Agent(_))
    }

    /// The caller's id regardless of type, as a string
    pub fn id_string(&self) -> String {
        match self {
            Self::Agent(id) => id.to_string(),
            Self::Human(id) => id.to_string(),
        }
    }

    /// The poster-type label persisted on tasks
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Agent(_) => "agent",
            Self::Human(_) => "human",
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_labels() {
        let agent = Caller::Agent(AgentId::new());
        let human = Caller::Human(HumanId::new());
        assert_eq!(agent.type_label(), "agent");
        assert_eq!(human.type_label(), "human");
        assert!(agent.is_agent());
        assert!(!human.is_agent());
    }

    #[test]
    fn test_caller_serde_tagging() {
        let caller = Caller::Human(HumanId::new());
        let json = serde_json::to_value(&caller).unwrap();
        assert_eq!(json["type"], "human");
    }
}
