//! Inventory service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::services::fault::FaultPlan;
use crate::services::journal::CallJournal;

const SERVICE: &str = "inventory";

/// Result of a successful inventory reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReceipt {
    /// The reservation ID assigned by the inventory service.
    pub reservation_id: String,
}

/// Trait for inventory management operations.
///
/// Reservation is the last step of the saga, so there is no release
/// operation: nothing after it can fail and require an undo.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reserves `quantity` units of `product_name`.
    async fn reserve(
        &self,
        product_name: &str,
        quantity: u32,
    ) -> Result<ReservationReceipt, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<String, u32>,
    reservations: HashMap<String, (String, u32)>,
    next_id: u32,
    reserve_attempts: u32,
    faults: FaultPlan,
}

/// In-memory inventory service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
    journal: Option<CallJournal>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every call into the shared journal.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Sets the stock of a product, builder style.
    pub fn with_stock(self, product_name: &str, units: u32) -> Self {
        self.set_stock(product_name, units);
        self
    }

    /// Sets the stock of a product.
    pub fn set_stock(&self, product_name: &str, units: u32) {
        self.write().stock.insert(product_name.to_string(), units);
    }

    /// Configures every reserve call to fail.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.write().faults.set_fail_always(fail);
    }

    /// Returns the number of reservations made.
    pub fn reservation_count(&self) -> usize {
        self.read(|state| state.reservations.len())
    }

    /// Returns true if a reservation exists with the given ID.
    pub fn has_reservation(&self, reservation_id: &str) -> bool {
        self.read(|state| state.reservations.contains_key(reservation_id))
    }

    /// Returns how many reserve calls were received, failed ones included.
    pub fn reserve_attempts(&self) -> u32 {
        self.read(|state| state.reserve_attempts)
    }

    /// Returns the remaining stock of a product.
    pub fn stock(&self, product_name: &str) -> u32 {
        self.read(|state| state.stock.get(product_name).copied().unwrap_or(0))
    }

    fn read<T>(&self, f: impl FnOnce(&InMemoryInventoryState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(
        &self,
        product_name: &str,
        quantity: u32,
    ) -> Result<ReservationReceipt, SagaError> {
        if let Some(journal) = &self.journal {
            journal.record(SERVICE, "reserve", &format!("{product_name}x{quantity}"));
        }
        let mut state = self.write();
        state.reserve_attempts += 1;

        if state.faults.should_fail() {
            return Err(SagaError::ServiceRejected {
                service: SERVICE,
                status: 409,
            });
        }

        let available = match state.stock.get_mut(product_name) {
            Some(units) => units,
            None => {
                return Err(SagaError::Declined {
                    service: SERVICE,
                    reason: format!("product '{product_name}' is not stocked"),
                });
            }
        };
        if *available < quantity {
            return Err(SagaError::Declined {
                service: SERVICE,
                reason: format!(
                    "Insufficient stock for '{product_name}': {available} available, {quantity} requested"
                ),
            });
        }
        *available -= quantity;

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state
            .reservations
            .insert(reservation_id.clone(), (product_name.to_string(), quantity));

        Ok(ReservationReceipt { reservation_id })
    }
}
