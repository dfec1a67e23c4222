//! Ticket lifecycle state machine.
//!
//! Per admission instance: ACTIVE -> USED (gate scan), ACTIVE -> REFUNDED
//! (refund workflow), and ownership reassignment on transfer (the instance
//! stays ACTIVE under the new owner; the credential identifiers remain
//! valid). USED and REFUNDED are terminal and mutually exclusive.
//!
//! Every transition locks the instance row first, so two simultaneous scans
//! of a screenshotted QR code resolve to exactly one admission.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::credential::CredentialCodec;
use crate::models::{Order, OrderStatus, TicketPurchase, TicketStatus, User};
use crate::notify::{Dispatcher, Notification};
use crate::services::inventory;
use crate::utils::error::AppError;

/// What gate staff see after a successful scan.
#[derive(Debug, Clone, Serialize)]
pub struct GateAdmission {
    pub purchase_id: Uuid,
    pub attendee_name: String,
    pub event_title: String,
    pub tier_name: String,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub purchase_id: Uuid,
    pub recipient_id: Uuid,
    pub recipient_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub order_id: Uuid,
    pub refunded_tickets: i64,
    pub refunded_amount: rust_decimal::Decimal,
}

/// Redeems a credential at the venue entrance.
///
/// Decode and signature checks happen before any store access. The
/// instance row is then locked and flipped to USED in the same
/// transaction; of two concurrent scans, the loser re-reads USED and gets
/// the already-used rejection, distinct from "not a valid ticket".
pub async fn validate_credential(
    pool: &PgPool,
    codec: &CredentialCodec,
    token: &str,
) -> Result<GateAdmission, AppError> {
    let payload = codec.decode(token)?;

    let mut tx = pool.begin().await?;

    let purchase: Option<TicketPurchase> = sqlx::query_as(
        r#"
        SELECT id, user_id, order_id, ticket_tier_id, event_id, status,
               credential, qr_code, purchased_at, used_at, updated_at
        FROM ticket_purchases
        WHERE id = $1 AND order_id = $2
        FOR UPDATE
        "#,
    )
    .bind(payload.purchase_id)
    .bind(payload.order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let purchase = purchase.ok_or_else(|| {
        AppError::NotFound("Credential does not match any ticket".to_string())
    })?;

    let order_status: OrderStatus =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(purchase.order_id)
            .fetch_one(&mut *tx)
            .await?;
    if order_status != OrderStatus::Paid {
        return Err(AppError::Conflict(
            "The order for this ticket has not been paid".to_string(),
        ));
    }

    match purchase.status {
        TicketStatus::Active => {}
        TicketStatus::Used => {
            return Err(AppError::Conflict(
                "Ticket has already been used for entry".to_string(),
            ));
        }
        TicketStatus::Refunded => {
            return Err(AppError::Conflict("Ticket has been refunded".to_string()));
        }
        TicketStatus::Transferred => {
            return Err(AppError::Conflict(
                "Ticket is no longer valid for entry".to_string(),
            ));
        }
    }

    let used_at = Utc::now();
    sqlx::query(
        r#"
        UPDATE ticket_purchases
        SET status = $2, used_at = $3, updated_at = now()
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(purchase.id)
    .bind(TicketStatus::Used)
    .bind(used_at)
    .bind(TicketStatus::Active)
    .execute(&mut *tx)
    .await?;

    let (attendee_name, event_title, tier_name): (String, String, String) = sqlx::query_as(
        r#"
        SELECT u.name, e.title, t.name
        FROM ticket_purchases tp
        JOIN users u ON u.id = tp.user_id
        JOIN events e ON e.id = tp.event_id
        JOIN ticket_tiers t ON t.id = tp.ticket_tier_id
        WHERE tp.id = $1
        "#,
    )
    .bind(purchase.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(purchase_id = %purchase.id, "Ticket redeemed at gate");
    Ok(GateAdmission {
        purchase_id: purchase.id,
        attendee_name,
        event_title,
        tier_name,
        used_at,
    })
}

/// Reassigns an active ticket to another account. The credential is not
/// re-issued; the same identifiers now admit the recipient.
pub async fn transfer_ticket(
    pool: &PgPool,
    dispatcher: &Dispatcher,
    purchase_id: Uuid,
    from_user_id: Uuid,
    to_email: &str,
) -> Result<TransferReceipt, AppError> {
    let mut tx = pool.begin().await?;

    let purchase: Option<TicketPurchase> = sqlx::query_as(
        r#"
        SELECT id, user_id, order_id, ticket_tier_id, event_id, status,
               credential, qr_code, purchased_at, used_at, updated_at
        FROM ticket_purchases
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(purchase_id)
    .fetch_optional(&mut *tx)
    .await?;

    let purchase = purchase.ok_or_else(|| {
        AppError::NotFound(format!("Ticket purchase {purchase_id} was not found"))
    })?;

    if purchase.user_id != from_user_id {
        return Err(AppError::Forbidden(
            "You do not own this ticket".to_string(),
        ));
    }
    if purchase.status != TicketStatus::Active {
        return Err(AppError::Conflict(
            "Only active tickets can be transferred".to_string(),
        ));
    }

    let sender_email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(from_user_id)
        .fetch_one(&mut *tx)
        .await?;

    let recipient: Option<User> = sqlx::query_as(
        r#"
        SELECT id, name, email, wallet_address, created_at, updated_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(to_email)
    .fetch_optional(&mut *tx)
    .await?;

    let recipient = recipient.ok_or_else(|| {
        AppError::NotFound("No account exists for the recipient email".to_string())
    })?;

    if recipient.id == from_user_id {
        return Err(AppError::ValidationError(
            "A ticket cannot be transferred to its current owner".to_string(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE ticket_purchases
        SET user_id = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(purchase.id)
    .bind(recipient.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    dispatcher.enqueue(Notification::TicketTransferred {
        sender_email,
        recipient_email: recipient.email.clone(),
        purchase_id: purchase.id,
    });

    info!(purchase_id = %purchase.id, recipient_id = %recipient.id, "Ticket transferred");
    Ok(TransferReceipt {
        purchase_id: purchase.id,
        recipient_id: recipient.id,
        recipient_email: recipient.email,
    })
}

/// Refunds a paid order in full. All-or-nothing: if any admission under the
/// order has already been used, the whole refund is refused, so a partially
/// consumed order never produces a partial payout.
pub async fn refund_order(
    pool: &PgPool,
    dispatcher: &Dispatcher,
    order_id: Uuid,
) -> Result<RefundOutcome, AppError> {
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

    if order.status != OrderStatus::Paid {
        return Err(AppError::Conflict(
            "Only paid orders can be refunded".to_string(),
        ));
    }

    let purchases: Vec<TicketPurchase> = sqlx::query_as(
        r#"
        SELECT id, user_id, order_id, ticket_tier_id, event_id, status,
               credential, qr_code, purchased_at, used_at, updated_at
        FROM ticket_purchases
        WHERE order_id = $1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *tx)
    .await?;

    if purchases.iter().any(|p| p.status == TicketStatus::Used) {
        return Err(AppError::Conflict(
            "Order is partially used and cannot be refunded".to_string(),
        ));
    }

    let result = sqlx::query(
        r#"
        UPDATE ticket_purchases
        SET status = $2, updated_at = now()
        WHERE order_id = $1 AND status = $3
        "#,
    )
    .bind(order_id)
    .bind(TicketStatus::Refunded)
    .bind(TicketStatus::Active)
    .execute(&mut *tx)
    .await?;

    // Return the freed units to each tier's pool.
    let mut per_tier: HashMap<Uuid, i32> = HashMap::new();
    for p in purchases.iter().filter(|p| p.status == TicketStatus::Active) {
        *per_tier.entry(p.ticket_tier_id).or_insert(0) += 1;
    }
    for (tier_id, count) in per_tier {
        inventory::release(&mut tx, tier_id, count).await?;
    }

    sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1")
        .bind(order_id)
        .bind(OrderStatus::Refunded)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let buyer_email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(order.user_id)
        .fetch_optional(pool)
        .await?;
    if let Some(email) = buyer_email {
        dispatcher.enqueue(Notification::OrderRefunded {
            email,
            order_id,
            amount: order.total_amount,
        });
    }

    info!(order_id = %order_id, refunded = result.rows_affected(), "Order refunded");
    Ok(RefundOutcome {
        order_id,
        refunded_tickets: result.rows_affected() as i64,
        refunded_amount: order.total_amount,
    })
}
