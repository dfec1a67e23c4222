use sqlx::PgPool;

use crate::credential::CredentialCodec;
use crate::notify::Dispatcher;

/// Shared per-request dependencies, cloned into each handler by axum.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub codec: CredentialCodec,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(pool: PgPool, codec: CredentialCodec, dispatcher: Dispatcher) -> Self {
        Self {
            pool,
            codec,
            dispatcher,
        }
    }
}
