//! External service traits, in-memory fakes, and HTTP adapters for saga steps.

pub mod catalog;
mod fault;
pub mod http;
pub mod inventory;
pub mod journal;
pub mod payment;
pub mod purchase;

pub use catalog::{CatalogService, InMemoryCatalogService, Product};
pub use http::{
    HttpCatalogService, HttpInventoryService, HttpPaymentService, HttpPurchaseService,
    ServiceEndpoint, build_client,
};
pub use inventory::{InMemoryInventoryService, InventoryService, ReservationReceipt};
pub use journal::CallJournal;
pub use payment::{InMemoryPaymentService, PaymentReceipt, PaymentService};
pub use purchase::{InMemoryPurchaseService, PurchaseReceipt, PurchaseService};
