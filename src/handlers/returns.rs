use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError, services::returns::ReturnLineInput, ApiResponse, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/deliveries/:id/returns",
            get(list_returns).post(process_returns),
        )
        .route("/deliveries/:id/returns/validate", post(validate_returns))
}

#[derive(Debug, Deserialize)]
struct ValidateBody {
    items: Vec<ReturnLineInput>,
}

async fn validate_returns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ValidateBody>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.returns.validate(id, &body.items).await?;
    Ok(Json(ApiResponse::success("valid")))
}

#[derive(Debug, Deserialize)]
struct ProcessBody {
    items: Vec<ReturnLineInput>,
    actor: Uuid,
}

async fn process_returns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProcessBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let processed = state
        .services
        .returns
        .process(id, &body.items, body.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(processed))))
}

async fn list_returns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let returns = state.services.returns.list_for_delivery(id).await?;
    Ok(Json(ApiResponse::success(returns)))
}
