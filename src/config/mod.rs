use std::env;
use std::net::SocketAddr;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;

pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_db_connections: u32,
    pub credential_signing_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let credential_signing_key = env::var("CREDENTIAL_SIGNING_KEY").unwrap_or_else(|_| {
            tracing::warn!(
                "CREDENTIAL_SIGNING_KEY is not set; using an insecure development key"
            );
            "insecure-dev-signing-key".to_string()
        });

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/tessera".to_string()),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            max_db_connections: env::var("MAX_DB_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_DB_CONNECTIONS),
            credential_signing_key,
        }
    }
}
