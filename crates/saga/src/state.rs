//! Saga state machine.

use serde::Serialize;

use crate::error::SagaError;
use crate::purchase_flow::Step;

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Init ──► Validating ──► Purchasing ──► Paying ──► Reserving ──► Succeeded
///              │              │             │           │
///              │              │             └─────┬─────┘
///              │              │                   ▼
///              └──────────────┴──────────► Compensating ──► Failed
///                  (nothing to undo: straight to Failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum SagaState {
    /// Saga has not started yet.
    #[default]
    Init,

    /// Looking the product up in the catalog.
    Validating,

    /// Creating the purchase record.
    Purchasing,

    /// Charging the payment.
    Paying,

    /// Reserving inventory.
    Reserving,

    /// Undoing committed steps after a failure.
    Compensating,

    /// All steps committed (terminal state).
    Succeeded,

    /// The saga gave up, after compensation if anything was committed
    /// (terminal state).
    Failed,
}

impl SagaState {
    /// The state in which the given forward step runs.
    pub fn for_step(step: Step) -> Self {
        match step {
            Step::Validate => SagaState::Validating,
            Step::Purchase => SagaState::Purchasing,
            Step::Payment => SagaState::Paying,
            Step::Reserve => SagaState::Reserving,
        }
    }

    /// Returns true if a forward step is running in this state.
    pub fn is_forward(&self) -> bool {
        matches!(
            self,
            SagaState::Validating | SagaState::Purchasing | SagaState::Paying | SagaState::Reserving
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Succeeded | SagaState::Failed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (Init, Validating)
            | (Validating, Purchasing)
            | (Purchasing, Paying)
            | (Paying, Reserving)
            | (Reserving, Succeeded)
            | (Compensating, Failed) => true,
            (from, Compensating) | (from, Failed) => from.is_forward(),
            _ => false,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Init => "Init",
            SagaState::Validating => "Validating",
            SagaState::Purchasing => "Purchasing",
            SagaState::Paying => "Paying",
            SagaState::Reserving => "Reserving",
            SagaState::Compensating => "Compensating",
            SagaState::Succeeded => "Succeeded",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the current state of one saga execution and every state it has
/// passed through.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: SagaState,
    history: Vec<SagaState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: SagaState::Init,
            history: vec![SagaState::Init],
        }
    }

    pub fn current(&self) -> SagaState {
        self.current
    }

    /// States visited so far, starting with `Init`.
    pub fn history(&self) -> &[SagaState] {
        &self.history
    }

    /// Moves to `next`, rejecting transitions the lifecycle forbids.
    pub fn advance(&mut self, next: SagaState) -> Result<(), SagaError> {
        if !self.current.can_transition_to(next) {
            return Err(SagaError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        tracing::debug!(from = %self.current, to = %next, "saga state transition");
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Drives a failed saga to `Failed`, through `Compensating` when asked.
    ///
    /// Unlike [`advance`](Self::advance) this never fails: it is the last
    /// resort of the error path and must always reach a terminal state.
    pub fn fail(&mut self, compensating: bool) {
        if self.current.is_terminal() {
            return;
        }
        if compensating && self.current != SagaState::Compensating {
            self.current = SagaState::Compensating;
            self.history.push(SagaState::Compensating);
        }
        self.current = SagaState::Failed;
        self.history.push(SagaState::Failed);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
