pub mod gate;
pub mod payments;
pub mod promo;
pub mod purchase;
pub mod tickets;

use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::utils::response::success;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "tessera-api",
    };

    success(payload, "Health check successful").into_response()
}
