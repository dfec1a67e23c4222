//! Order reads and the payment-confirmation transition.

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatus, TicketStatus};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialHandout {
    pub purchase_id: Uuid,
    pub status: TicketStatus,
    pub credential: String,
    pub qr_code: Option<String>,
}

/// A user's orders, newest first, with their line items.
pub async fn list_orders(pool: &PgPool, user_id: Uuid) -> Result<Vec<OrderSummary>, AppError> {
    let orders: Vec<Order> = sqlx::query_as(
        r#"
        SELECT id, user_id, event_id, total_amount, status, created_at, updated_at
        FROM orders
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::with_capacity(orders.len());
    for order in orders {
        let items: Vec<OrderItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, ticket_tier_id, quantity, price_at_time
            FROM order_items
            WHERE order_id = $1
            "#,
        )
        .bind(order.id)
        .fetch_all(pool)
        .await?;
        summaries.push(OrderSummary { order, items });
    }
    Ok(summaries)
}

/// The credentials issued under an order, for display in the buyer's
/// wallet/tickets screen. Only the order owner may fetch them.
pub async fn get_credentials(
    pool: &PgPool,
    order_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<CredentialHandout>, AppError> {
    let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

    let owner = owner
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} was not found")))?;
    if owner != user_id {
        return Err(AppError::Forbidden(
            "You do not own this order".to_string(),
        ));
    }

    let rows: Vec<(Uuid, TicketStatus, String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT id, status, credential, qr_code
        FROM ticket_purchases
        WHERE order_id = $1
        ORDER BY purchased_at
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(purchase_id, status, credential, qr_code)| CredentialHandout {
            purchase_id,
            status,
            credential,
            qr_code,
        })
        .collect())
}

/// Pending -> paid, driven by the external payment gateway's confirmation.
/// Records the gateway's reference alongside. Rejects orders that are not
/// pending so a late or duplicated webhook cannot resurrect a refunded
/// order.
pub async fn mark_paid(
    pool: &PgPool,
    order_id: Uuid,
    provider_reference: Option<&str>,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let order: Option<Order> = sqlx::query_as(
        r#"
        SELECT id, user_id, event_id, total_amount, status, created_at, updated_at
        FROM orders
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let order = order
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} was not found")))?;
    if order.status != OrderStatus::Pending {
        return Err(AppError::Conflict(
            "Order is not awaiting payment".to_string(),
        ));
    }

    sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1")
        .bind(order_id)
        .bind(OrderStatus::Paid)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO payments (order_id, amount, currency, status, provider_reference)
        VALUES ($1, $2, 'USD', 'completed', $3)
        "#,
    )
    .bind(order_id)
    .bind(order.total_amount)
    .bind(provider_reference)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(order_id = %order_id, "Order marked paid");
    Ok(())
}
