use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{orders::{CreateOrderRequest, OrderItemInput}, pricing::PriceMode},
    ApiResponse, AppState, ListQuery,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/items", put(update_items))
        .route("/orders/:id/submit", post(submit_order))
        .route("/orders/:id/approve", post(approve_order))
        .route("/orders/:id/reject", post(reject_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/complete", post(complete_order))
        .route("/orders/:id/documents", post(regenerate_documents))
        .route("/orders/:id/stock-availability", get(stock_availability))
        .route("/stores/:store_id/orders", get(list_store_orders))
}

#[derive(Debug, Deserialize)]
struct CreateOrderBody {
    #[serde(flatten)]
    request: CreateOrderRequest,
    /// Operator-entered orders may override line prices.
    #[serde(default)]
    operator_entered: bool,
}

async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let mode = if body.operator_entered {
        PriceMode::Operator
    } else {
        PriceMode::Store
    };
    let details = state.services.orders.create_order(body.request, mode).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

async fn list_store_orders(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders_for_store(store_id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[derive(Debug, Deserialize)]
struct UpdateItemsBody {
    items: Vec<OrderItemInput>,
    discount_amount: Option<Decimal>,
    #[serde(default)]
    operator_entered: bool,
}

async fn update_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateItemsBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let mode = if body.operator_entered {
        PriceMode::Operator
    } else {
        PriceMode::Store
    };
    let details = state
        .services
        .orders
        .update_order_items(id, body.items, body.discount_amount, mode)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

async fn submit_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.submit_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[derive(Debug, Deserialize)]
struct ActorBody {
    actor: Uuid,
    reason: Option<String>,
}

async fn approve_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.approval.approve_order(id, body.actor).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn reject_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .reject_order(id, body.actor, body.reason)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.cancel_order(id, body.actor).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.complete_order(id, body.actor).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Backfills missing kitchen sheet / delivery / invoice for an approved
/// order; the generators are idempotent, so this is safe to repeat.
async fn regenerate_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.approval.regenerate_documents(id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn stock_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.services.stock.validate_availability(id).await?;
    Ok(Json(ApiResponse::success(report)))
}
