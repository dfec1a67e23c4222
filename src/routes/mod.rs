use axum::{
    routing::{get, post},
    Router,
};

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    gate, health_check, payments, promo, purchase,
    tickets,
};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tickets/purchase", post(purchase::purchase_tickets))
        .route("/users/:user_id/orders", get(tickets::list_user_orders))
        .route("/orders/:order_id/credentials", get(tickets::order_credentials))
        .route("/tickets/:purchase_id/transfer", post(tickets::transfer_ticket))
        .route("/gate/validate", post(gate::validate_credential))
        .route("/promo/validate", post(promo::validate_promo))
        .route("/payments/confirm", post(payments::confirm_payment))
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
