//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::services::fault::FaultPlan;
use crate::services::journal::CallJournal;

const SERVICE: &str = "payments";

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// The payment ID assigned by the payment service.
    pub payment_id: String,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges `amount` to `user_id` for the given purchase.
    async fn charge(
        &self,
        user_id: &str,
        amount: Money,
        purchase_id: &str,
    ) -> Result<PaymentReceipt, SagaError>;

    /// Refunds a previously made payment.
    async fn refund(&self, payment_id: &str) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, (String, Money, String)>,
    next_id: u32,
    charge_attempts: u32,
    charge_faults: FaultPlan,
    refund_faults: FaultPlan,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
    journal: Option<CallJournal>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every call into the shared journal.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Configures every charge call to fail.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.write().charge_faults.set_fail_always(fail);
    }

    /// Configures the next `calls` charge calls to fail, then succeed.
    pub fn fail_next_charges(&self, calls: u32) {
        self.write().charge_faults.set_fail_next(calls);
    }

    /// Configures every refund call to fail.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().refund_faults.set_fail_always(fail);
    }

    /// Returns the number of active payments.
    pub fn payment_count(&self) -> usize {
        self.read(|state| state.payments.len())
    }

    /// Returns true if a payment exists with the given ID.
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.read(|state| state.payments.contains_key(payment_id))
    }

    /// Returns how many charge calls were received, failed ones included.
    pub fn charge_attempts(&self) -> u32 {
        self.read(|state| state.charge_attempts)
    }

    fn read<T>(&self, f: impl FnOnce(&InMemoryPaymentState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        user_id: &str,
        amount: Money,
        purchase_id: &str,
    ) -> Result<PaymentReceipt, SagaError> {
        if let Some(journal) = &self.journal {
            journal.record(SERVICE, "charge", &format!("{purchase_id}/{amount}"));
        }
        let mut state = self.write();
        state.charge_attempts += 1;

        if state.charge_faults.should_fail() {
            return Err(SagaError::Declined {
                service: SERVICE,
                reason: "Payment declined".to_string(),
            });
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.payments.insert(
            payment_id.clone(),
            (user_id.to_string(), amount, purchase_id.to_string()),
        );

        Ok(PaymentReceipt { payment_id })
    }

    async fn refund(&self, payment_id: &str) -> Result<(), SagaError> {
        if let Some(journal) = &self.journal {
            journal.record(SERVICE, "refund", payment_id);
        }
        let mut state = self.write();

        if state.refund_faults.should_fail() {
            return Err(SagaError::ServiceRejected {
                service: SERVICE,
                status: 500,
            });
        }

        state
            .payments
            .remove(payment_id)
            .map(|_| ())
            .ok_or_else(|| SagaError::Declined {
                service: SERVICE,
                reason: format!("payment {payment_id} not found"),
            })
    }
}
