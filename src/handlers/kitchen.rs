use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{errors::ServiceError, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/kitchen-sheets/:id", get(get_sheet))
        .route("/kitchen-sheets/:id/document", get(sheet_document))
        .route("/kitchen-sheets/items/:item_id/prepare", post(prepare_item))
}

async fn get_sheet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (sheet, items) = state.services.kitchen.get_sheet(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "sheet": sheet,
        "items": items,
    }))))
}

#[derive(Debug, Deserialize)]
struct DocumentQuery {
    /// `category` (default) or `expiry`.
    group_by: Option<String>,
}

async fn sheet_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DocumentQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let to_json = |value: serde_json::Result<serde_json::Value>| {
        value.map_err(|e| ServiceError::InternalError(e.to_string()))
    };

    match query.group_by.as_deref() {
        Some("expiry") => {
            let groups = state.services.documents.kitchen_sheet_by_expiry(id).await?;
            Ok(Json(ApiResponse::success(to_json(serde_json::to_value(
                groups,
            ))?)))
        }
        None | Some("category") => {
            let groups = state.services.documents.kitchen_sheet_by_category(id).await?;
            Ok(Json(ApiResponse::success(to_json(serde_json::to_value(
                groups,
            ))?)))
        }
        Some(other) => Err(ServiceError::ValidationError(format!(
            "unknown grouping '{}'; expected 'category' or 'expiry'",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct PrepareBody {
    actor: Uuid,
    batch_number: Option<String>,
    expiry_date: Option<NaiveDate>,
}

async fn prepare_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(body): Json<PrepareBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .kitchen
        .mark_item_prepared(item_id, body.actor, body.batch_number, body.expiry_date)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}
