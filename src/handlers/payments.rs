use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::orders;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::empty_success;

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub order_id: Uuid,
    #[serde(default)]
    pub provider_reference: Option<String>,
}

/// Entry point for the payment gateway's confirmation callback.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<Response, AppError> {
    orders::mark_paid(
        &state.pool,
        body.order_id,
        body.provider_reference.as_deref(),
    )
    .await?;
    Ok(empty_success("Payment recorded").into_response())
}
