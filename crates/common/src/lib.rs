//! Shared value types used across the saga core and its HTTP host.

pub mod money;
pub mod types;

pub use money::{Money, MoneyError};
pub use types::SagaId;
