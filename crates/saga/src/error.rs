//! Saga error types.

use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
///
/// External client calls report every failure through this type; the
/// orchestrator decides from the failing step (not from the variant) whether
/// the failure is retried, compensated, or terminal.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The catalog has no product with the requested name.
    #[error("Product '{0}' does not exist in the catalog")]
    ProductNotFound(String),

    /// A service answered with a non-success status.
    #[error("{service} service rejected the request with status {status}")]
    ServiceRejected { service: &'static str, status: u16 },

    /// The call never produced a response (timeout, connection refused, ...).
    #[error("{service} service unreachable: {reason}")]
    Transport {
        service: &'static str,
        reason: String,
    },

    /// A success response carried a body that could not be decoded.
    #[error("{service} service returned an invalid response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    /// A service rejected the operation for a business reason.
    #[error("{service} service declined: {reason}")]
    Declined {
        service: &'static str,
        reason: String,
    },

    /// The saga request failed validation before any step ran.
    #[error("Invalid purchase request: {0}")]
    InvalidRequest(String),

    /// The orchestrator attempted a transition the state machine forbids.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    /// The saga was aborted while waiting (shutdown or caller cancellation).
    #[error("Saga execution was cancelled")]
    Cancelled,

    /// Any other fault raised while orchestrating.
    #[error("Internal saga error: {0}")]
    Internal(String),
}

impl SagaError {
    /// Returns true for faults that abort the saga regardless of the step
    /// that was running.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidTransition { .. } | SagaError::Cancelled | SagaError::Internal(_)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
