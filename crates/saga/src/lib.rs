//! Saga orchestration for the purchase workflow.
//!
//! A purchase spans four independently owned services and is coordinated
//! without a distributed transaction:
//! 1. Validate the product in the catalog (read-only, single attempt)
//! 2. Create the purchase (retried with exponential backoff)
//! 3. Charge the payment (retried with exponential backoff)
//! 4. Reserve inventory (single attempt)
//!
//! When a step fails, the steps already committed are undone in reverse
//! order with best-effort compensating calls.

pub mod compensation;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod progress;
pub mod purchase_flow;
pub mod request;
pub mod retry;
pub mod services;
pub mod state;

pub use compensation::{
    CompensationExecutor, CompensationRecord, CompensationReport, CompensationResult,
};
pub use error::SagaError;
pub use orchestrator::{DEFAULT_STEP_DELAY, PurchaseSaga, SagaOrchestrator, SagaSettings};
pub use outcome::{PurchaseData, SagaOutcome, SagaReport, SagaStatus};
pub use progress::SagaProgress;
pub use purchase_flow::{RetryMode, Step};
pub use request::SagaRequest;
pub use retry::{RetryController, RetryPolicy, RetryResult};
pub use services::{
    CallJournal, CatalogService, HttpCatalogService, HttpInventoryService, HttpPaymentService,
    HttpPurchaseService, InMemoryCatalogService, InMemoryInventoryService, InMemoryPaymentService,
    InMemoryPurchaseService, InventoryService, PaymentReceipt, PaymentService, Product,
    PurchaseReceipt, PurchaseService, ReservationReceipt, ServiceEndpoint, build_client,
};
pub use state::{SagaState, StateMachine};
