//! Shared fixtures for the store-backed tests.
//!
//! These tests need `DATABASE_URL` pointing at a disposable Postgres; the
//! schema is migrated on first connect (sqlx serializes concurrent
//! migration runs with an advisory lock).

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use tessera_server::credential::CredentialCodec;
use tessera_server::notify::{Dispatcher, LogSender};

pub async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a disposable Postgres for these tests");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

pub fn codec() -> CredentialCodec {
    CredentialCodec::new("test-signing-key".as_bytes())
}

pub fn dispatcher() -> Dispatcher {
    Dispatcher::start(Arc::new(LogSender))
}

pub async fn seed_user(pool: &PgPool) -> Uuid {
    let tag = Uuid::new_v4();
    sqlx::query_scalar(
        r#"
        INSERT INTO users (name, email, wallet_address)
        VALUES ('Test Attendee', $1, $2)
        RETURNING id
        "#,
    )
    .bind(format!("attendee+{tag}@example.com"))
    .bind(format!("WALLET{tag}"))
    .fetch_one(pool)
    .await
    .expect("seed user")
}

pub async fn seed_event(pool: &PgPool) -> Uuid {
    let organizer_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO organizers (name, contact_email)
        VALUES ('Test Organizer', 'organizer@example.com')
        RETURNING id
        "#,
    )
    .fetch_one(pool)
    .await
    .expect("seed organizer");

    sqlx::query_scalar(
        r#"
        INSERT INTO events (organizer_id, title, location, start_time)
        VALUES ($1, 'Test Festival', 'Nairobi', $2)
        RETURNING id
        "#,
    )
    .bind(organizer_id)
    .bind(Utc::now() + Duration::days(30))
    .fetch_one(pool)
    .await
    .expect("seed event")
}

pub async fn seed_tier(pool: &PgPool, event_id: Uuid, total: i32, price: Decimal) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO ticket_tiers
            (event_id, name, price, total_quantity, available_quantity, max_per_purchase)
        VALUES ($1, 'Regular', $2, $3, $3, 10)
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(price)
    .bind(total)
    .fetch_one(pool)
    .await
    .expect("seed ticket tier")
}

pub async fn seed_flash_sale(
    pool: &PgPool,
    event_id: Uuid,
    code: &str,
    max_redemptions: Option<i32>,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO flash_sales
            (event_id, name, discount_percent, promo_code, starts_at, ends_at, max_redemptions)
        VALUES ($1, 'Flash', 20, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(code)
    .bind(Utc::now() - Duration::hours(1))
    .bind(Utc::now() + Duration::hours(1))
    .bind(max_redemptions)
    .fetch_one(pool)
    .await
    .expect("seed flash sale")
}

pub async fn available_quantity(pool: &PgPool, tier_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT available_quantity FROM ticket_tiers WHERE id = $1")
        .bind(tier_id)
        .fetch_one(pool)
        .await
        .expect("read availability")
}
