use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use tessera_server::config::Config;
use tessera_server::credential::CredentialCodec;
use tessera_server::notify::{Dispatcher, LogSender};
use tessera_server::routes::create_routes;
use tessera_server::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    // Consumed login nonces only leave the table through this sweep.
    let nonce_pool = pool.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            if let Err(err) = tessera_server::services::replay::purge_expired(&nonce_pool).await {
                tracing::warn!(?err, "Nonce purge failed");
            }
        }
    });

    let codec = CredentialCodec::new(config.credential_signing_key.as_bytes());
    let dispatcher = Dispatcher::start(Arc::new(LogSender));
    let app = create_routes(AppState::new(pool, codec, dispatcher));

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
