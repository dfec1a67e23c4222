use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::purchase::{self, PurchaseRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Caller identity arrives as an explicit id; session extraction is the
/// gateway's job, not this service's.
#[derive(Deserialize)]
pub struct PurchaseBody {
    pub user_id: Uuid,
    pub ticket_tier_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub promo_code: Option<String>,
}

pub async fn purchase_tickets(
    State(state): State<AppState>,
    Json(body): Json<PurchaseBody>,
) -> Result<Response, AppError> {
    let receipt = purchase::purchase(
        &state.pool,
        &state.codec,
        &state.dispatcher,
        PurchaseRequest {
            user_id: body.user_id,
            ticket_tier_id: body.ticket_tier_id,
            quantity: body.quantity,
            promo_code: body.promo_code,
        },
    )
    .await?;

    Ok(success(receipt, "Purchase completed").into_response())
}
