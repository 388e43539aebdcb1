use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::enums::StockMovementReason, errors::ServiceError, ApiResponse, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stores/:store_id/stock/:product_id", get(get_stock_level))
        .route("/stock/apply", post(apply_stock_movement))
}

#[derive(Debug, Serialize)]
struct StockLevel {
    store_id: Uuid,
    product_id: Uuid,
    quantity: i32,
}

async fn get_stock_level(
    State(state): State<AppState>,
    Path((store_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let quantity = state
        .services
        .stock
        .quantity_on_hand(store_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(StockLevel {
        store_id,
        product_id,
        quantity,
    })))
}

#[derive(Debug, Deserialize)]
struct ApplyStockBody {
    store_id: Uuid,
    product_id: Uuid,
    /// Positive count for consume/restore; signed delta for adjust.
    quantity: i32,
    reason: StockMovementReason,
    actor: Option<Uuid>,
}

async fn apply_stock_movement(
    State(state): State<AppState>,
    Json(body): Json<ApplyStockBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let quantity = state
        .services
        .stock
        .apply(
            body.store_id,
            body.product_id,
            body.quantity,
            body.reason,
            body.actor,
        )
        .await?;
    Ok(Json(ApiResponse::success(StockLevel {
        store_id: body.store_id,
        product_id: body.product_id,
        quantity,
    })))
}
