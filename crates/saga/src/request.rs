//! Saga input.

use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Input to one saga execution: who buys what, for how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaRequest {
    pub user_id: String,
    pub product_name: String,
    pub amount: Money,
}

impl SagaRequest {
    /// Builds a validated request.
    pub fn new(
        user_id: impl Into<String>,
        product_name: impl Into<String>,
        amount: Money,
    ) -> Result<Self, SagaError> {
        let request = Self {
            user_id: user_id.into(),
            product_name: product_name.into(),
            amount,
        };
        request.validate()?;
        Ok(request)
    }

    /// Checks the invariants a deserialized request may violate.
    pub fn validate(&self) -> Result<(), SagaError> {
        if self.user_id.trim().is_empty() {
            return Err(SagaError::InvalidRequest("userId must not be empty".to_string()));
        }
        if self.product_name.trim().is_empty() {
            return Err(SagaError::InvalidRequest(
                "productName must not be empty".to_string(),
            ));
        }
        if !self.amount.is_positive() {
            return Err(SagaError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}
