//! Error types for OpenWork
//!
//! Every rejected operation carries a stable error code and an
//! HTTP-equivalent class so API consumers can branch programmatically
//! rather than string-matching.

use thiserror::Error;

/// Result type for OpenWork operations
pub type WorkResult<T> = std::result::Result<T, WorkError>;

/// HTTP-equivalent classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Missing/malformed fields, wrong status for the requested transition
    BadRequest,
    /// No usable caller identity
    Unauthorized,
    /// Caller identity is valid but not allowed to perform the operation
    Forbidden,
    /// Idempotency-safe rejection (double funding, re-resolution)
    Conflict,
    /// Referenced entity does not exist
    NotFound,
    /// Upstream chain/judge unavailable or rejected the call
    Upstream,
    /// Unexpected internal failure
    Internal,
}

/// OpenWork error types
#[derive(Debug, Clone, Error)]
pub enum WorkError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Invalid input field
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    /// Task is in the wrong status for the requested transition
    #[error("Task {task_id} is {status}; cannot {operation}")]
    InvalidStatus {
        task_id: String,
        status: String,
        operation: String,
    },

    /// Budget outside platform bounds
    #[error("Budget {requested} outside platform bounds (max {max})")]
    BudgetOutOfRange { requested: f64, max: f64 },

    /// Task inputs do not satisfy the target agent's declared schema
    #[error("Task inputs missing required field(s): {missing}")]
    InputSchemaMismatch { missing: String },

    /// Target agent is not accepting work
    #[error("Agent {agent_id} is {status} and cannot accept work")]
    AgentUnavailable { agent_id: String, status: String },

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    /// No usable caller identity
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Caller is not allowed to perform this operation
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    // ========================================================================
    // Not-Found Errors
    // ========================================================================

    /// Task not found
    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    /// Agent not found
    #[error("Agent {agent_id} not found")]
    AgentNotFound { agent_id: String },

    /// Dispute not found
    #[error("Dispute {dispute_id} not found")]
    DisputeNotFound { dispute_id: String },

    // ========================================================================
    // Conflict Errors
    // ========================================================================

    /// Escrow already deposited for this task
    #[error("Escrow already deposited for task {task_id}")]
    EscrowAlreadyFunded { task_id: String },

    /// Dispute already resolved
    #[error("Dispute {dispute_id} has already been resolved")]
    DisputeAlreadyResolved { dispute_id: String },

    /// A dispute is already open for this task
    #[error("Task {task_id} already has an open dispute")]
    DisputeAlreadyOpen { task_id: String },

    // ========================================================================
    // Permit Errors
    // ========================================================================

    /// Permit deadline has passed
    #[error("Permit expired at {deadline}")]
    PermitExpired { deadline: String },

    /// Permit amount does not match the task budget
    #[error("Permit amount mismatch: expected {expected}, got {got}")]
    PermitAmountMismatch { expected: f64, got: f64 },

    // ========================================================================
    // Upstream/Chain Errors
    // ========================================================================

    /// Custody signer not configured - funding and release cannot proceed
    #[error("Custody signer is not configured")]
    CustodyNotConfigured,

    /// Chain RPC unavailable (retryable)
    #[error("Chain unavailable: {message}")]
    ChainUnavailable { message: String },

    /// Chain rejected the submission (signature mismatch, insufficient balance)
    #[error("Chain rejected submission: {message}")]
    ChainRejected { message: String },

    /// Automated judge failed to render a verdict
    #[error("Judge failed: {message}")]
    JudgeFailed { message: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WorkError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// HTTP-equivalent class of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput { .. }
            | Self::InvalidStatus { .. }
            | Self::BudgetOutOfRange { .. }
            | Self::InputSchemaMismatch { .. }
            | Self::AgentUnavailable { .. }
            | Self::AmountOverflow
            | Self::PermitExpired { .. }
            | Self::PermitAmountMismatch { .. } => ErrorClass::BadRequest,
            Self::Unauthorized { .. } => ErrorClass::Unauthorized,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::TaskNotFound { .. }
            | Self::AgentNotFound { .. }
            | Self::DisputeNotFound { .. } => ErrorClass::NotFound,
            Self::EscrowAlreadyFunded { .. }
            | Self::DisputeAlreadyResolved { .. }
            | Self::DisputeAlreadyOpen { .. } => ErrorClass::Conflict,
            Self::CustodyNotConfigured
            | Self::ChainUnavailable { .. }
            | Self::ChainRejected { .. }
            | Self::JudgeFailed { .. } => ErrorClass::Upstream,
            Self::Internal { .. } => ErrorClass::Internal,
        }
    }

    /// Whether a caller may reasonably retry the same request
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ChainUnavailable { .. } | Self::CustodyNotConfigured | Self::Internal { .. }
        )
    }

    /// Stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidStatus { .. } => "INVALID_STATUS",
            Self::BudgetOutOfRange { .. } => "BUDGET_OUT_OF_RANGE",
            Self::InputSchemaMismatch { .. } => "INPUT_SCHEMA_MISMATCH",
            Self::AgentUnavailable { .. } => "AGENT_UNAVAILABLE",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::DisputeNotFound { .. } => "DISPUTE_NOT_FOUND",
            Self::EscrowAlreadyFunded { .. } => "ESCROW_ALREADY_FUNDED",
            Self::DisputeAlreadyResolved { .. } => "DISPUTE_ALREADY_RESOLVED",
            Self::DisputeAlreadyOpen { .. } => "DISPUTE_ALREADY_OPEN",
            Self::PermitExpired { .. } => "PERMIT_EXPIRED",
            Self::PermitAmountMismatch { .. } => "PERMIT_AMOUNT_MISMATCH",
            Self::CustodyNotConfigured => "CUSTODY_NOT_CONFIGURED",
            Self::ChainUnavailable { .. } => "CHAIN_UNAVAILABLE",
            Self::ChainRejected { .. } => "CHAIN_REJECTED",
            Self::JudgeFailed { .. } => "JUDGE_FAILED",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = WorkError::EscrowAlreadyFunded {
            task_id: "test".to_string(),
        };
        assert_eq!(err.error_code(), "ESCROW_ALREADY_FUNDED");
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[test]
    fn test_retriable_errors() {
        assert!(WorkError::CustodyNotConfigured.is_retriable());
        assert!(WorkError::ChainUnavailable {
            message: "rpc down".to_string()
        }
        .is_retriable());

        let forbidden = WorkError::forbidden("not the poster");
        assert!(!forbidden.is_retriable());
    }

    #[test]
    fn test_permit_errors_are_distinct() {
        // Expiry and rejection must never be conflated: one is deterministic
        // from the deadline, the other comes back from the chain.
        let expired = WorkError::PermitExpired {
            deadline: "2026-01-01T00:00:00Z".to_string(),
        };
        let rejected = WorkError::ChainRejected {
            message: "bad signature".to_string(),
        };
        assert_ne!(expired.error_code(), rejected.error_code());
        assert_eq!(expired.class(), ErrorClass::BadRequest);
        assert_eq!(rejected.class(), ErrorClass::Upstream);
    }
}
