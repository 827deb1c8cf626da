//! Best-effort undo of committed saga steps.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::progress::SagaProgress;
use crate::purchase_flow::Step;
use crate::retry::cancellable_sleep;
use crate::services::payment::PaymentService;
use crate::services::purchase::PurchaseService;

/// What happened when undoing one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CompensationResult {
    /// The undo call succeeded.
    Compensated { transaction_id: String },
    /// The undo call failed; the failure was logged and swallowed.
    Failed {
        transaction_id: String,
        reason: String,
    },
    /// No call was made: the step never committed or has no undo.
    Skipped,
}

impl CompensationResult {
    fn label(&self) -> &'static str {
        match self {
            CompensationResult::Compensated { .. } => "compensated",
            CompensationResult::Failed { .. } => "failed",
            CompensationResult::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationRecord {
    pub step: Step,
    #[serde(flatten)]
    pub result: CompensationResult,
}

/// Per-step results of one compensation pass, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompensationReport {
    records: Vec<CompensationRecord>,
}

impl CompensationReport {
    pub fn records(&self) -> &[CompensationRecord] {
        &self.records
    }

    /// Steps whose undo call was issued, in call order.
    pub fn attempted_steps(&self) -> Vec<Step> {
        self.records
            .iter()
            .filter(|record| record.result != CompensationResult::Skipped)
            .map(|record| record.step)
            .collect()
    }

    /// Steps whose undo call failed.
    pub fn failed_steps(&self) -> Vec<Step> {
        self.records
            .iter()
            .filter(|record| matches!(record.result, CompensationResult::Failed { .. }))
            .map(|record| record.step)
            .collect()
    }

    /// True if no undo call failed.
    pub fn is_clean(&self) -> bool {
        self.failed_steps().is_empty()
    }
}

/// Issues undo calls for committed steps.
///
/// Failures are logged and recorded in the report but never retried and
/// never propagated: the saga outcome is already decided when this runs.
pub struct CompensationExecutor<'a, P: ?Sized, Pay: ?Sized> {
    purchases: &'a P,
    payments: &'a Pay,
    pacing: Duration,
    cancel: &'a CancellationToken,
}

impl<'a, P, Pay> CompensationExecutor<'a, P, Pay>
where
    P: PurchaseService + ?Sized,
    Pay: PaymentService + ?Sized,
{
    pub fn new(
        purchases: &'a P,
        payments: &'a Pay,
        pacing: Duration,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            purchases,
            payments,
            pacing,
            cancel,
        }
    }

    /// Undoes `steps` in exactly the order given.
    ///
    /// A step is skipped when it has no undo operation or when `progress`
    /// holds no identifier for it. The pacing delay is observed before every
    /// issued call; cancellation cuts the delay short but the call is still
    /// made.
    pub async fn compensate(&self, steps: &[Step], progress: &SagaProgress) -> CompensationReport {
        tracing::warn!(steps = ?steps, "running compensations");
        let mut report = CompensationReport::default();

        for &step in steps {
            let transaction_id = match progress.transaction_id(step) {
                Some(id) if step.is_compensable() => id.to_string(),
                _ => {
                    tracing::debug!(%step, "nothing to compensate");
                    report.records.push(CompensationRecord {
                        step,
                        result: CompensationResult::Skipped,
                    });
                    continue;
                }
            };

            if cancellable_sleep(self.cancel, self.pacing).await.is_err() {
                tracing::debug!(%step, "compensation pacing cut short by cancellation");
            }

            tracing::info!(%step, %transaction_id, "compensating step");
            let outcome = match step {
                Step::Purchase => self.purchases.cancel(&transaction_id).await,
                Step::Payment => self.payments.refund(&transaction_id).await,
                Step::Validate | Step::Reserve => Ok(()),
            };

            let result = match outcome {
                Ok(()) => {
                    tracing::info!(%step, %transaction_id, "step compensated");
                    CompensationResult::Compensated { transaction_id }
                }
                Err(err) => {
                    tracing::error!(%step, %transaction_id, error = %err, "compensation failed");
                    CompensationResult::Failed {
                        transaction_id,
                        reason: err.to_string(),
                    }
                }
            };
            metrics::counter!(
                "saga_compensations_total",
                "step" => step.as_str(),
                "result" => result.label()
            )
            .increment(1);
            report.records.push(CompensationRecord { step, result });
        }

        report
    }
}
