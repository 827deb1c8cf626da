//! Saga results as seen by callers.

use common::SagaId;
use serde::Serialize;

use crate::compensation::CompensationReport;
use crate::purchase_flow::{MSG_SAGA_COMPENSATED, MSG_SAGA_SUCCEEDED};
use crate::services::catalog::Product;
use crate::state::SagaState;

/// HTTP-style status paired with every saga outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SagaStatus {
    /// 200: every step committed.
    Ok,
    /// 404: the product does not exist.
    NotFound,
    /// 409: a step failed; committed steps were compensated.
    Conflict,
    /// 500: an unexpected fault aborted the saga.
    InternalError,
}

impl SagaStatus {
    pub fn code(&self) -> u16 {
        match self {
            SagaStatus::Ok => 200,
            SagaStatus::NotFound => 404,
            SagaStatus::Conflict => 409,
            SagaStatus::InternalError => 500,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SagaStatus::Ok => "ok",
            SagaStatus::NotFound => "not_found",
            SagaStatus::Conflict => "conflict",
            SagaStatus::InternalError => "internal_error",
        }
    }
}

/// Identifiers of everything a successful saga committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseData {
    pub product: Product,
    pub purchase_id: String,
    pub payment_id: String,
    pub reservation_id: String,
}

/// Response body of a saga execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PurchaseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_used: Option<u32>,
}

impl SagaOutcome {
    pub fn succeeded(data: PurchaseData) -> Self {
        Self {
            success: true,
            message: MSG_SAGA_SUCCEEDED.to_string(),
            data: Some(data),
            error: None,
            attempts_used: None,
        }
    }

    /// A failure that needed no compensation.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: "Purchase failed".to_string(),
            data: None,
            error: Some(error.into()),
            attempts_used: None,
        }
    }

    /// A failure after which committed steps were compensated.
    pub fn compensated(error: impl Into<String>) -> Self {
        Self {
            message: MSG_SAGA_COMPENSATED.to_string(),
            ..Self::failed(error)
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts_used = Some(attempts);
        self
    }
}

/// Everything known about a finished saga execution.
#[derive(Debug, Clone)]
pub struct SagaReport {
    pub saga_id: SagaId,
    pub status: SagaStatus,
    pub outcome: SagaOutcome,
    /// Always `Succeeded` or `Failed`.
    pub final_state: SagaState,
    /// States visited, starting with `Init`.
    pub history: Vec<SagaState>,
    /// Present when a compensation pass ran.
    pub compensation: Option<CompensationReport>,
}
