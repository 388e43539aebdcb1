use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::enums::DeliveryStatus,
    errors::ServiceError,
    services::deliveries::DeliveryUpdate,
    ApiResponse, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", post(update_status))
        .route("/deliveries/:id/document", get(delivery_document))
}

async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let delivery = state.services.deliveries.get_delivery(id).await?;
    Ok(Json(ApiResponse::success(delivery)))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: DeliveryStatus,
    #[serde(flatten)]
    update: DeliveryUpdate,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let delivery = state
        .services
        .deliveries
        .update_status(id, body.status, body.update)
        .await?;
    Ok(Json(ApiResponse::success(delivery)))
}

async fn delivery_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let groups = state.services.documents.delivery_by_category(id).await?;
    Ok(Json(ApiResponse::success(groups)))
}
