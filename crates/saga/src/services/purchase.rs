//! Purchase service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::services::fault::FaultPlan;
use crate::services::journal::CallJournal;

const SERVICE: &str = "purchases";

/// Result of a successful purchase creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    /// The purchase ID assigned by the purchase service.
    pub purchase_id: String,
}

/// Trait for purchase record operations.
#[async_trait]
pub trait PurchaseService: Send + Sync {
    /// Creates a purchase of `product_name` for `user_id`.
    async fn create(&self, user_id: &str, product_name: &str)
    -> Result<PurchaseReceipt, SagaError>;

    /// Cancels a previously created purchase.
    async fn cancel(&self, purchase_id: &str) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryPurchaseState {
    purchases: HashMap<String, (String, String)>,
    next_id: u32,
    create_attempts: u32,
    create_faults: FaultPlan,
    cancel_faults: FaultPlan,
}

/// In-memory purchase service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPurchaseService {
    state: Arc<RwLock<InMemoryPurchaseState>>,
    journal: Option<CallJournal>,
}

impl InMemoryPurchaseService {
    /// Creates a new in-memory purchase service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every call into the shared journal.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Configures every create call to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().create_faults.set_fail_always(fail);
    }

    /// Configures the next `calls` create calls to fail, then succeed.
    pub fn fail_next_creates(&self, calls: u32) {
        self.write().create_faults.set_fail_next(calls);
    }

    /// Configures every cancel call to fail.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.write().cancel_faults.set_fail_always(fail);
    }

    /// Returns the number of active (not cancelled) purchases.
    pub fn purchase_count(&self) -> usize {
        self.read(|state| state.purchases.len())
    }

    /// Returns true if an active purchase exists with the given ID.
    pub fn has_purchase(&self, purchase_id: &str) -> bool {
        self.read(|state| state.purchases.contains_key(purchase_id))
    }

    /// Returns how many create calls were received, failed ones included.
    pub fn create_attempts(&self) -> u32 {
        self.read(|state| state.create_attempts)
    }

    fn read<T>(&self, f: impl FnOnce(&InMemoryPurchaseState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPurchaseState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PurchaseService for InMemoryPurchaseService {
    async fn create(
        &self,
        user_id: &str,
        product_name: &str,
    ) -> Result<PurchaseReceipt, SagaError> {
        if let Some(journal) = &self.journal {
            journal.record(SERVICE, "create", &format!("{user_id}/{product_name}"));
        }
        let mut state = self.write();
        state.create_attempts += 1;

        if state.create_faults.should_fail() {
            return Err(SagaError::ServiceRejected {
                service: SERVICE,
                status: 503,
            });
        }

        state.next_id += 1;
        let purchase_id = format!("PUR-{:04}", state.next_id);
        state.purchases.insert(
            purchase_id.clone(),
            (user_id.to_string(), product_name.to_string()),
        );

        Ok(PurchaseReceipt { purchase_id })
    }

    async fn cancel(&self, purchase_id: &str) -> Result<(), SagaError> {
        if let Some(journal) = &self.journal {
            journal.record(SERVICE, "cancel", purchase_id);
        }
        let mut state = self.write();

        if state.cancel_faults.should_fail() {
            return Err(SagaError::ServiceRejected {
                service: SERVICE,
                status: 500,
            });
        }

        state
            .purchases
            .remove(purchase_id)
            .map(|_| ())
            .ok_or_else(|| SagaError::Declined {
                service: SERVICE,
                reason: format!("purchase {purchase_id} not found"),
            })
    }
}
