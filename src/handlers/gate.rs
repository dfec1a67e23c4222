use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::services::lifecycle;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Deserialize)]
pub struct ValidateBody {
    /// The token decoded from the scanned QR image by the gate device.
    pub credential: String,
}

pub async fn validate_credential(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Result<Response, AppError> {
    let admission =
        lifecycle::validate_credential(&state.pool, &state.codec, &body.credential).await?;
    Ok(success(admission, "Ticket admitted").into_response())
}
