use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError, services::payments::RecordPaymentRequest, ApiResponse, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(record_payment))
        .route("/invoices/:id", get(get_invoice))
        .route("/invoices/:id/payments", get(list_payments))
}

async fn record_payment(
    State(state): State<AppState>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state.services.payments.record_payment(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let invoice = state.services.invoicing.get_invoice(id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payments = state.services.payments.list_for_invoice(id).await?;
    Ok(Json(ApiResponse::success(payments)))
}
