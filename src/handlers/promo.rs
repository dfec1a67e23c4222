use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::promo;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Deserialize)]
pub struct PromoBody {
    pub event_id: Uuid,
    pub code: String,
    pub ticket_tier_id: Uuid,
}

/// Read-side check for checkout UIs; the binding check happens inside the
/// purchase transaction.
pub async fn validate_promo(
    State(state): State<AppState>,
    Json(body): Json<PromoBody>,
) -> Result<Response, AppError> {
    let mut conn = state.pool.acquire().await?;
    let terms =
        promo::validate_promo(&mut conn, body.event_id, &body.code, body.ticket_tier_id).await?;
    Ok(success(terms, "Promo code is valid").into_response())
}
