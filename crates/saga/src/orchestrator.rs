//! Saga orchestrator for the purchase workflow.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::SagaId;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::compensation::{CompensationExecutor, CompensationReport};
use crate::error::SagaError;
use crate::outcome::{PurchaseData, SagaOutcome, SagaReport, SagaStatus};
use crate::progress::SagaProgress;
use crate::purchase_flow::{self, RESERVATION_QUANTITY, RetryMode, SAGA_TYPE, Step};
use crate::request::SagaRequest;
use crate::retry::{RetryController, RetryPolicy, RetryResult, cancellable_sleep};
use crate::services::catalog::CatalogService;
use crate::services::inventory::InventoryService;
use crate::services::payment::PaymentService;
use crate::services::purchase::PurchaseService;
use crate::state::{SagaState, StateMachine};

/// Default pacing delay between forward steps and between compensations.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_secs(2);

/// Tunables of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaSettings {
    /// Policy for steps with [`RetryMode::Bounded`].
    pub retry: RetryPolicy,
    /// Pause after each committed forward step (except the last) and before
    /// each compensation call.
    pub step_delay: Duration,
}

impl SagaSettings {
    /// Settings without any waiting, for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            retry: RetryPolicy::new(max_attempts, Duration::ZERO),
            step_delay: Duration::ZERO,
        }
    }
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            step_delay: DEFAULT_STEP_DELAY,
        }
    }
}

/// Anything that can run a purchase saga to completion.
///
/// Execution is infallible: every failure is folded into the report.
#[async_trait]
pub trait PurchaseSaga: Send + Sync {
    /// A fresh token for one execution, cancelled on shutdown.
    fn cancellation_token(&self) -> CancellationToken;

    /// Runs one saga; cancelling `cancel` aborts it at its next wait and
    /// compensates whatever it had committed.
    async fn execute_with_cancel(
        &self,
        request: SagaRequest,
        cancel: CancellationToken,
    ) -> SagaReport;

    async fn execute(&self, request: SagaRequest) -> SagaReport {
        self.execute_with_cancel(request, self.cancellation_token())
            .await
    }
}

/// Why forward progress stopped.
#[derive(Debug)]
enum Halt {
    /// A step failed after the attempts its retry mode allows.
    StepFailed {
        step: Step,
        error: SagaError,
        attempts: u32,
    },
    /// Anything else: illegal transition, cancellation, caught panic.
    Unexpected(SagaError),
}

impl From<SagaError> for Halt {
    fn from(err: SagaError) -> Self {
        Halt::Unexpected(err)
    }
}

/// Orchestrates purchase sagas: validate → purchase → payment → reserve.
///
/// The orchestrator itself is stateless between executions; all
/// per-execution bookkeeping lives in values created inside
/// [`execute`](Self::execute), so one instance can serve concurrent sagas.
pub struct SagaOrchestrator<C, P, Pay, I> {
    catalog: C,
    purchases: P,
    payments: Pay,
    inventory: I,
    settings: SagaSettings,
    shutdown: CancellationToken,
}

impl<C, P, Pay, I> SagaOrchestrator<C, P, Pay, I>
where
    C: CatalogService,
    P: PurchaseService,
    Pay: PaymentService,
    I: InventoryService,
{
    /// Creates a new saga orchestrator.
    pub fn new(
        catalog: C,
        purchases: P,
        payments: Pay,
        inventory: I,
        settings: SagaSettings,
    ) -> Self {
        Self {
            catalog,
            purchases,
            payments,
            inventory,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Ties every execution to `shutdown`: cancelling it aborts pending
    /// retry and pacing waits of all in-flight sagas.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn settings(&self) -> &SagaSettings {
        &self.settings
    }

    /// Runs one saga under a child of the shutdown token.
    pub async fn execute(&self, request: SagaRequest) -> SagaReport {
        self.execute_with_cancel(request, self.shutdown.child_token())
            .await
    }

    /// Runs one saga; cancelling `cancel` aborts it at its next wait.
    pub async fn execute_with_cancel(
        &self,
        request: SagaRequest,
        cancel: CancellationToken,
    ) -> SagaReport {
        let saga_id = SagaId::new();
        let span = tracing::info_span!(
            "saga",
            saga_type = SAGA_TYPE,
            %saga_id,
            user_id = %request.user_id,
            product = %request.product_name,
        );
        self.run(saga_id, request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        saga_id: SagaId,
        request: SagaRequest,
        cancel: CancellationToken,
    ) -> SagaReport {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();
        tracing::info!(amount = %request.amount, "saga started");

        let mut machine = StateMachine::new();
        let mut progress = SagaProgress::new();
        let retry = RetryController::new(self.settings.retry, cancel.clone());

        let steps = self.run_steps(&request, &mut machine, &mut progress, &retry, &cancel);
        let forward = AssertUnwindSafe(steps)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Halt::Unexpected(SagaError::Internal(panic_message(panic.as_ref()))))
            });

        let (status, outcome, compensation) = match forward {
            Ok(data) => match machine.advance(SagaState::Succeeded) {
                Ok(()) => (SagaStatus::Ok, SagaOutcome::succeeded(data), None),
                Err(err) => {
                    let halt = Halt::Unexpected(err);
                    self.conclude_failure(&request, halt, &mut machine, &progress, &cancel)
                        .await
                }
            },
            Err(halt) => {
                self.conclude_failure(&request, halt, &mut machine, &progress, &cancel)
                    .await
            }
        };

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        if outcome.success {
            metrics::counter!("saga_completed").increment(1);
            tracing::info!(duration, "saga completed successfully");
        } else {
            metrics::counter!("saga_failed", "status" => status.label()).increment(1);
            tracing::warn!(duration, status = status.code(), error = ?outcome.error, "saga failed");
        }

        SagaReport {
            saga_id,
            status,
            outcome,
            final_state: machine.current(),
            history: machine.history().to_vec(),
            compensation,
        }
    }

    /// Runs the forward steps, recording each commit in `progress`.
    async fn run_steps(
        &self,
        request: &SagaRequest,
        machine: &mut StateMachine,
        progress: &mut SagaProgress,
        retry: &RetryController,
        cancel: &CancellationToken,
    ) -> Result<PurchaseData, Halt> {
        // 1. Validate the product
        self.enter(machine, Step::Validate)?;
        let (product, _) = self
            .run_step(Step::Validate, retry, || {
                self.catalog.find_product(&request.product_name)
            })
            .await?;
        tracing::info!(
            step = %Step::Validate,
            product = %product.name,
            price = ?product.price,
            "product validated"
        );
        self.pace(cancel).await?;

        // 2. Create the purchase
        self.enter(machine, Step::Purchase)?;
        let (purchase, attempts) = self
            .run_step(Step::Purchase, retry, || {
                self.purchases
                    .create(&request.user_id, &request.product_name)
            })
            .await?;
        progress.record(Step::Purchase, purchase.purchase_id.clone());
        tracing::info!(
            step = %Step::Purchase,
            purchase_id = %purchase.purchase_id,
            attempts,
            "purchase created"
        );
        self.pace(cancel).await?;

        // 3. Charge the payment
        self.enter(machine, Step::Payment)?;
        let (payment, attempts) = self
            .run_step(Step::Payment, retry, || {
                self.payments
                    .charge(&request.user_id, request.amount, &purchase.purchase_id)
            })
            .await?;
        progress.record(Step::Payment, payment.payment_id.clone());
        tracing::info!(
            step = %Step::Payment,
            payment_id = %payment.payment_id,
            attempts,
            "payment processed"
        );
        self.pace(cancel).await?;

        // 4. Reserve inventory
        self.enter(machine, Step::Reserve)?;
        let (reservation, _) = self
            .run_step(Step::Reserve, retry, || {
                self.inventory
                    .reserve(&request.product_name, RESERVATION_QUANTITY)
            })
            .await?;
        tracing::info!(
            step = %Step::Reserve,
            reservation_id = %reservation.reservation_id,
            "inventory reserved"
        );

        Ok(PurchaseData {
            product,
            purchase_id: purchase.purchase_id,
            payment_id: payment.payment_id,
            reservation_id: reservation.reservation_id,
        })
    }

    fn enter(&self, machine: &mut StateMachine, step: Step) -> Result<(), SagaError> {
        machine.advance(SagaState::for_step(step))?;
        tracing::info!(
            step = %step,
            "step {}/{} started",
            step.position(),
            Step::SEQUENCE.len()
        );
        Ok(())
    }

    /// Runs one step according to its retry mode.
    async fn run_step<T, F, Fut>(
        &self,
        step: Step,
        retry: &RetryController,
        mut operation: F,
    ) -> Result<(T, u32), Halt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SagaError>>,
    {
        let result = match step.retry_mode() {
            RetryMode::Bounded => retry.execute(step.as_str(), operation).await,
            RetryMode::SingleAttempt => RetryResult {
                outcome: operation().await,
                attempts: 1,
            },
        };

        match result.outcome {
            Ok(value) => Ok((value, result.attempts)),
            Err(err) if err.is_unexpected() => Err(Halt::Unexpected(err)),
            Err(err) => {
                tracing::error!(step = %step, attempts = result.attempts, error = %err, "step failed");
                Err(Halt::StepFailed {
                    step,
                    error: err,
                    attempts: result.attempts,
                })
            }
        }
    }

    async fn pace(&self, cancel: &CancellationToken) -> Result<(), SagaError> {
        cancellable_sleep(cancel, self.settings.step_delay).await
    }

    /// Compensates what the halted saga committed and builds its outcome.
    async fn conclude_failure(
        &self,
        request: &SagaRequest,
        halt: Halt,
        machine: &mut StateMachine,
        progress: &SagaProgress,
        cancel: &CancellationToken,
    ) -> (SagaStatus, SagaOutcome, Option<CompensationReport>) {
        let failed_step = match &halt {
            Halt::StepFailed { step, .. } => Some(*step),
            Halt::Unexpected(_) => None,
        };
        let plan = purchase_flow::compensation_plan(failed_step);
        let needs_compensation = plan.iter().any(|step| progress.is_committed(*step));

        let compensation = if needs_compensation {
            if let Err(err) = machine.advance(SagaState::Compensating) {
                tracing::error!(error = %err, "compensating from an unexpected state");
            }
            let executor = CompensationExecutor::new(
                &self.purchases,
                &self.payments,
                self.settings.step_delay,
                cancel,
            );
            let report = executor.compensate(&plan, progress).await;
            if !report.is_clean() {
                tracing::error!(
                    failed = ?report.failed_steps(),
                    "compensation incomplete; manual reconciliation required"
                );
            }
            Some(report)
        } else {
            None
        };
        machine.fail(needs_compensation);

        let (status, outcome) = match halt {
            Halt::StepFailed {
                step: Step::Validate,
                error,
                ..
            } => {
                let message = match error {
                    SagaError::ProductNotFound(_) => error.to_string(),
                    other => format!(
                        "Product '{}' could not be validated: {other}",
                        request.product_name
                    ),
                };
                (SagaStatus::NotFound, SagaOutcome::failed(message))
            }
            Halt::StepFailed {
                step,
                error,
                attempts,
            } => {
                let message = match step {
                    Step::Purchase => {
                        format!("Failed to create purchase after {attempts} attempts: {error}")
                    }
                    Step::Payment => {
                        format!("Failed to process payment after {attempts} attempts: {error}")
                    }
                    _ => format!("Failed to reserve inventory: {error}"),
                };
                let outcome = if needs_compensation {
                    SagaOutcome::compensated(message)
                } else {
                    SagaOutcome::failed(message)
                };
                let outcome = match step.retry_mode() {
                    RetryMode::Bounded => outcome.with_attempts(attempts),
                    RetryMode::SingleAttempt => outcome,
                };
                (SagaStatus::Conflict, outcome)
            }
            Halt::Unexpected(error) => {
                tracing::error!(error = %error, "unexpected error during saga");
                let outcome = if needs_compensation {
                    SagaOutcome::compensated("Internal server error")
                } else {
                    SagaOutcome::failed("Internal server error")
                };
                (SagaStatus::InternalError, outcome)
            }
        };

        (status, outcome, compensation)
    }
}

#[async_trait]
impl<C, P, Pay, I> PurchaseSaga for SagaOrchestrator<C, P, Pay, I>
where
    C: CatalogService,
    P: PurchaseService,
    Pay: PaymentService,
    I: InventoryService,
{
    fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    async fn execute_with_cancel(
        &self,
        request: SagaRequest,
        cancel: CancellationToken,
    ) -> SagaReport {
        SagaOrchestrator::execute_with_cancel(self, request, cancel).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("step panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("step panicked: {message}")
    } else {
        "step panicked".to_string()
    }
}
