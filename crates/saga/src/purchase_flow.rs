//! Purchase saga step definitions.
//!
//! The step sequence is fixed: validate → purchase → payment → reserve.
//! Retry eligibility and compensability are properties of each [`Step`],
//! so the orchestrator cannot accidentally retry the inventory reservation
//! or try to undo the catalog lookup.

use serde::Serialize;

/// The saga type identifier used in logs and metrics.
pub const SAGA_TYPE: &str = "Purchase";

/// Step name: Validate the product against the catalog.
pub const STEP_VALIDATE: &str = "validate";

/// Step name: Create the purchase record.
pub const STEP_PURCHASE: &str = "purchase";

/// Step name: Charge the payment.
pub const STEP_PAYMENT: &str = "payment";

/// Step name: Reserve inventory.
pub const STEP_RESERVE: &str = "reserve";

/// Units reserved per purchase.
pub const RESERVATION_QUANTITY: u32 = 1;

/// Message returned when every step committed.
pub const MSG_SAGA_SUCCEEDED: &str = "Purchase processed successfully";

/// Message suffix for failures that ran compensations.
pub const MSG_SAGA_COMPENSATED: &str = "Purchase failed - compensations executed";

/// How failures of a step are handled before the saga gives up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Failures are retried through the retry controller.
    Bounded,
    /// Exactly one attempt; any failure is permanent.
    SingleAttempt,
}

/// A forward step of the purchase saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validate,
    Purchase,
    Payment,
    Reserve,
}

impl Step {
    /// All steps in forward order.
    pub const SEQUENCE: [Step; 4] = [Step::Validate, Step::Purchase, Step::Payment, Step::Reserve];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Validate => STEP_VALIDATE,
            Step::Purchase => STEP_PURCHASE,
            Step::Payment => STEP_PAYMENT,
            Step::Reserve => STEP_RESERVE,
        }
    }

    /// One-based position in the sequence, for "step 2/4" style logs.
    pub fn position(&self) -> usize {
        match self {
            Step::Validate => 1,
            Step::Purchase => 2,
            Step::Payment => 3,
            Step::Reserve => 4,
        }
    }

    pub fn retry_mode(&self) -> RetryMode {
        match self {
            Step::Purchase | Step::Payment => RetryMode::Bounded,
            // Lookup is read-only; a missing product or missing stock is a
            // business condition that retrying cannot fix.
            Step::Validate | Step::Reserve => RetryMode::SingleAttempt,
        }
    }

    /// Returns true if the step commits something that has an undo operation.
    pub fn is_compensable(&self) -> bool {
        matches!(self, Step::Purchase | Step::Payment)
    }
}

/// Steps to undo, most recent first, when forward progress stops.
///
/// `failed` is the step that could not complete; only compensable steps
/// before it are listed. `None` (an unexpected fault with no step to blame)
/// lists every compensable step, and the executor skips whatever never
/// committed.
pub fn compensation_plan(failed: Option<Step>) -> Vec<Step> {
    Step::SEQUENCE
        .iter()
        .rev()
        .copied()
        .filter(Step::is_compensable)
        .filter(|step| failed.is_none_or(|failed| step.position() < failed.position()))
        .collect()
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
