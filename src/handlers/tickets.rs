use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::{lifecycle, orders};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let summaries = orders::list_orders(&state.pool, user_id).await?;
    Ok(success(summaries, "Orders fetched").into_response())
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

pub async fn order_credentials(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Response, AppError> {
    let credentials = orders::get_credentials(&state.pool, order_id, owner.user_id).await?;
    Ok(success(credentials, "Credentials fetched").into_response())
}

#[derive(Deserialize)]
pub struct TransferBody {
    pub from_user_id: Uuid,
    pub to_email: String,
}

pub async fn transfer_ticket(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
    Json(body): Json<TransferBody>,
) -> Result<Response, AppError> {
    let receipt = lifecycle::transfer_ticket(
        &state.pool,
        &state.dispatcher,
        purchase_id,
        body.from_user_id,
        &body.to_email,
    )
    .await?;

    Ok(success(receipt, "Ticket transferred").into_response())
}
