//! Purchase orchestrator: the one transaction that may not oversell.
//!
//! The write path is a single transaction covering the tier lock, the
//! conditional inventory decrement, the optional promo redemption and the
//! order/ticket inserts. Credential tokens and QR images only need
//! identifiers, so they are prepared before the transaction opens and the
//! row locks are held across store operations only, never across rendering.
//! Side effects (email, notification) are enqueued strictly after commit
//! and can never roll a purchase back.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::credential::CredentialCodec;
use crate::models::{TicketStatus, TicketTier, User};
use crate::notify::{Dispatcher, Notification};
use crate::services::{inventory, promo};
use crate::utils::error::AppError;

#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub user_id: Uuid,
    pub ticket_tier_id: Uuid,
    pub quantity: i32,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub purchase_id: Uuid,
    pub credential: String,
    pub qr_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub order_id: Uuid,
    pub event_id: Uuid,
    pub total_amount: Decimal,
    pub credentials: Vec<IssuedCredential>,
}

pub async fn purchase(
    pool: &PgPool,
    codec: &CredentialCodec,
    dispatcher: &Dispatcher,
    request: PurchaseRequest,
) -> Result<PurchaseReceipt, AppError> {
    let now = Utc::now();

    // Preflight on an unlocked read: sizes the work and rejects the easy
    // cases early. Everything here is re-checked under the row lock.
    let tier = fetch_tier(pool, request.ticket_tier_id, false).await?;
    tier.ensure_quantity_allowed(request.quantity)?;
    tier.ensure_sales_open(now)?;

    let buyer: Option<User> = sqlx::query_as(
        r#"
        SELECT id, name, email, wallet_address, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(request.user_id)
    .fetch_optional(pool)
    .await?;
    let buyer = buyer.ok_or_else(|| {
        AppError::NotFound(format!("User {} was not found", request.user_id))
    })?;

    // One credential per admitted unit, rendered before any lock is taken.
    let order_id = Uuid::new_v4();
    let mut credentials = Vec::with_capacity(request.quantity as usize);
    for _ in 0..request.quantity {
        let purchase_id = Uuid::new_v4();
        let token = codec.encode(purchase_id, order_id, now)?;
        let qr_code = codec.render_qr(&token)?;
        credentials.push(IssuedCredential {
            purchase_id,
            credential: token,
            qr_code,
        });
    }

    let mut tx = pool.begin().await?;

    let tier = fetch_tier(&mut *tx, request.ticket_tier_id, true).await?;
    tier.ensure_quantity_allowed(request.quantity)?;
    tier.ensure_sales_open(now)?;

    inventory::reserve(&mut tx, tier.id, request.quantity).await?;

    let discount = match &request.promo_code {
        Some(code) => {
            let terms = promo::validate_promo(&mut tx, tier.event_id, code, tier.id).await?;
            promo::redeem(&mut tx, terms.flash_sale_id, now).await?;
            Some(terms)
        }
        None => None,
    };

    let total_amount = compute_total(&tier, request.quantity, discount.as_ref());

    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, event_id, total_amount, status)
        VALUES ($1, $2, $3, $4, 'pending')
        "#,
    )
    .bind(order_id)
    .bind(buyer.id)
    .bind(tier.event_id)
    .bind(total_amount)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO order_items (order_id, ticket_tier_id, quantity, price_at_time)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id)
    .bind(tier.id)
    .bind(request.quantity)
    .bind(tier.price)
    .execute(&mut *tx)
    .await?;

    for issued in &credentials {
        sqlx::query(
            r#"
            INSERT INTO ticket_purchases
                (id, user_id, order_id, ticket_tier_id, event_id, status, credential, qr_code, purchased_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(issued.purchase_id)
        .bind(buyer.id)
        .bind(order_id)
        .bind(tier.id)
        .bind(tier.event_id)
        .bind(TicketStatus::Active)
        .bind(&issued.credential)
        .bind(&issued.qr_code)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    // Post-commit only. A full queue or dead worker is a logging problem,
    // not a purchase failure.
    dispatcher.enqueue(Notification::PurchaseConfirmed {
        email: buyer.email,
        order_id,
        event_id: tier.event_id,
        quantity: request.quantity,
        total_amount,
    });

    info!(
        order_id = %order_id,
        tier_id = %tier.id,
        quantity = request.quantity,
        %total_amount,
        "Purchase committed"
    );

    Ok(PurchaseReceipt {
        order_id,
        event_id: tier.event_id,
        total_amount,
        credentials,
    })
}

async fn fetch_tier<'a, E>(executor: E, tier_id: Uuid, lock: bool) -> Result<TicketTier, AppError>
where
    E: sqlx::PgExecutor<'a>,
{
    let base = r#"
        SELECT id, event_id, name, description, price, total_quantity, available_quantity,
               max_per_purchase, group_min_quantity, group_discount_percent,
               sales_start_time, sales_end_time, created_at, updated_at
        FROM ticket_tiers
        WHERE id = $1
        "#;
    let sql = if lock {
        format!("{base} FOR UPDATE")
    } else {
        base.to_string()
    };

    let tier: Option<TicketTier> = sqlx::query_as(&sql)
        .bind(tier_id)
        .fetch_optional(executor)
        .await?;
    tier.ok_or_else(|| AppError::NotFound(format!("Ticket tier {tier_id} was not found")))
}

/// Order total from the locked tier row: price snapshot times quantity,
/// group discount when the threshold is met, then the promo discount.
fn compute_total(
    tier: &TicketTier,
    quantity: i32,
    discount: Option<&promo::DiscountTerms>,
) -> Decimal {
    let mut total = tier.price * Decimal::from(quantity);
    if let Some(percent) = tier.group_discount_for(quantity) {
        total = total * (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED;
    }
    if let Some(terms) = discount {
        total = terms.apply(total);
    }
    total.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tier(price: Decimal) -> TicketTier {
        let now = Utc::now();
        TicketTier {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "VIP".to_string(),
            description: None,
            price,
            total_quantity: 50,
            available_quantity: 50,
            max_per_purchase: 10,
            group_min_quantity: Some(4),
            group_discount_percent: Some(Decimal::new(15, 0)),
            sales_start_time: None,
            sales_end_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn total_is_price_times_quantity() {
        let t = tier(Decimal::new(2500, 2)); // 25.00
        assert_eq!(compute_total(&t, 3, None), Decimal::new(7500, 2));
    }

    #[test]
    fn group_discount_kicks_in_at_threshold() {
        let t = tier(Decimal::new(10000, 2)); // 100.00
        assert_eq!(compute_total(&t, 3, None), Decimal::new(30000, 2));
        // 4 x 100 with 15% off = 340.00
        assert_eq!(compute_total(&t, 4, None), Decimal::new(34000, 2));
    }

    #[test]
    fn promo_discount_stacks_after_group_discount() {
        let t = tier(Decimal::new(10000, 2));
        let terms = promo::DiscountTerms {
            flash_sale_id: Uuid::new_v4(),
            name: "Flash".to_string(),
            discount_percent: Decimal::new(10, 0),
        };
        // 4 x 100 -> 340 after group discount -> 306 after 10% promo.
        assert_eq!(
            compute_total(&t, 4, Some(&terms)),
            Decimal::new(30600, 2)
        );
    }

    #[test]
    fn odd_amounts_round_to_cents() {
        let t = tier(Decimal::new(999, 2)); // 9.99
        let terms = promo::DiscountTerms {
            flash_sale_id: Uuid::new_v4(),
            name: "Flash".to_string(),
            discount_percent: Decimal::new(33, 0),
        };
        // 9.99 * 0.67 = 6.6933 -> 6.69
        assert_eq!(compute_total(&t, 1, Some(&terms)), Decimal::new(669, 2));
    }
}
