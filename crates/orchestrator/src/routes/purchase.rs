//! Purchase saga trigger endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use saga::{PurchaseSaga, SagaOutcome, SagaRequest, SagaStatus};
use tracing::Instrument;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub saga: Arc<dyn PurchaseSaga>,
}

impl AppState {
    pub fn new(saga: impl PurchaseSaga + 'static) -> Self {
        Self {
            saga: Arc::new(saga),
        }
    }
}

/// POST /purchase: run one purchase saga to completion.
///
/// Responds with the saga outcome and its status (200, 404, 409 or 500).
/// Requests that fail validation never start a saga and get a 400.
///
/// The saga runs in its own task. If the client goes away first, the drop
/// guard cancels the saga, which then compensates what it committed.
#[tracing::instrument(skip(state, payload))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SagaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SagaOutcome>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        metrics::counter!("purchase_requests_rejected_total").increment(1);
        ApiError::BadRequest(rejection.body_text())
    })?;
    if let Err(err) = request.validate() {
        metrics::counter!("purchase_requests_rejected_total").increment(1);
        return Err(err.into());
    }

    let cancel = state.saga.cancellation_token();
    let _cancel_on_disconnect = cancel.clone().drop_guard();
    let saga = Arc::clone(&state.saga);
    let execution = tokio::spawn(
        async move { saga.execute_with_cancel(request, cancel).await }
            .instrument(tracing::Span::current()),
    );
    let report = execution
        .await
        .map_err(|err| ApiError::Internal(format!("saga task failed: {err}")))?;
    tracing::info!(
        saga_id = %report.saga_id,
        status = report.status.code(),
        final_state = %report.final_state,
        "purchase saga finished"
    );

    Ok((status_code(report.status), Json(report.outcome)))
}

fn status_code(status: SagaStatus) -> StatusCode {
    match status {
        SagaStatus::Ok => StatusCode::OK,
        SagaStatus::NotFound => StatusCode::NOT_FOUND,
        SagaStatus::Conflict => StatusCode::CONFLICT,
        SagaStatus::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
