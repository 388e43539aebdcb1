use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{errors::ServiceError, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stores/:store_id/replenishment/needs", get(check_needs))
        .route("/stores/:store_id/replenishment/generate", post(generate))
        .route("/replenishment/generate-all", post(generate_all))
}

async fn check_needs(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let needs = state.services.replenishment.check_store_needs(store_id).await?;
    Ok(Json(ApiResponse::success(needs)))
}

async fn generate(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    match state.services.replenishment.generate_order(store_id).await? {
        Some(order) => Ok((StatusCode::CREATED, Json(ApiResponse::success(Some(order))))),
        None => Ok((StatusCode::OK, Json(ApiResponse::success(None)))),
    }
}

async fn generate_all(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.services.replenishment.generate_all_orders().await?;
    Ok(Json(ApiResponse::success(summary)))
}
