//! Per-execution bookkeeping of committed steps.

use crate::purchase_flow::Step;

/// Transaction identifiers of the steps one saga execution has committed.
///
/// A fresh value is created for every execution and threaded through the
/// step sequence by `&mut`; it is never stored on the orchestrator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SagaProgress {
    committed: Vec<(Step, String)>,
}

impl SagaProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the identifier a step returned on success.
    ///
    /// Recording the same step twice replaces the identifier but keeps the
    /// original commit position.
    pub fn record(&mut self, step: Step, transaction_id: impl Into<String>) {
        let transaction_id = transaction_id.into();
        match self.committed.iter_mut().find(|(s, _)| *s == step) {
            Some(entry) => entry.1 = transaction_id,
            None => self.committed.push((step, transaction_id)),
        }
    }

    /// Returns the identifier recorded for `step`, if it committed.
    pub fn transaction_id(&self, step: Step) -> Option<&str> {
        self.committed
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, id)| id.as_str())
    }

    pub fn is_committed(&self, step: Step) -> bool {
        self.transaction_id(step).is_some()
    }

    /// Committed steps in the order they completed.
    pub fn committed_steps(&self) -> Vec<Step> {
        self.committed.iter().map(|(step, _)| *step).collect()
    }

    /// Committed compensable steps, most recent first.
    pub fn rollback_order(&self) -> Vec<Step> {
        self.committed
            .iter()
            .rev()
            .map(|(step, _)| *step)
            .filter(Step::is_compensable)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}
