//! Flash-sale promo validation and redemption.
//!
//! Validation is a read-side convenience for checkout UIs. Redemption is
//! the binding step: one conditional UPDATE that checks activity, window
//! and cap in the same statement that increments the counter, executed
//! inside the purchase transaction. The cap cannot be exceeded by
//! concurrent checkouts because there is no separate check-then-increment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::FlashSale;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct DiscountTerms {
    pub flash_sale_id: Uuid,
    pub name: String,
    pub discount_percent: Decimal,
}

impl DiscountTerms {
    /// The amount after this discount, rounded to cents.
    pub fn apply(&self, amount: Decimal) -> Decimal {
        (amount * (Decimal::ONE_HUNDRED - self.discount_percent) / Decimal::ONE_HUNDRED)
            .round_dp(2)
    }
}

/// Looks up a promo code for an event and checks it against the given tier.
/// Returns the discount terms a purchase with this code would receive.
pub async fn validate_promo(
    conn: &mut PgConnection,
    event_id: Uuid,
    code: &str,
    tier_id: Uuid,
) -> Result<DiscountTerms, AppError> {
    let sale: Option<FlashSale> = sqlx::query_as(
        r#"
        SELECT id, event_id, name, discount_percent, promo_code, starts_at, ends_at,
               is_active, max_redemptions, current_redemptions, created_at, updated_at
        FROM flash_sales
        WHERE event_id = $1 AND promo_code = $2
        "#,
    )
    .bind(event_id)
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    let sale = sale.ok_or_else(|| {
        AppError::NotFound("No such promo code for this event".to_string())
    })?;

    sale.ensure_redeemable(Utc::now())?;

    // An empty applicability set means the sale covers every tier.
    let applies: bool = sqlx::query_scalar(
        r#"
        SELECT NOT EXISTS (SELECT 1 FROM flash_sale_tiers WHERE flash_sale_id = $1)
            OR EXISTS (
                SELECT 1 FROM flash_sale_tiers
                WHERE flash_sale_id = $1 AND ticket_tier_id = $2
            )
        "#,
    )
    .bind(sale.id)
    .bind(tier_id)
    .fetch_one(&mut *conn)
    .await?;

    if !applies {
        return Err(AppError::Conflict(
            "This promo code does not apply to the selected ticket tier".to_string(),
        ));
    }

    Ok(DiscountTerms {
        flash_sale_id: sale.id,
        name: sale.name,
        discount_percent: sale.discount_percent,
    })
}

/// Consumes one redemption. The guard and the increment are one atomic
/// statement; zero rows affected means the sale is gone, closed or at cap.
pub async fn redeem(
    conn: &mut PgConnection,
    flash_sale_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE flash_sales
        SET current_redemptions = current_redemptions + 1,
            updated_at = now()
        WHERE id = $1
          AND is_active
          AND $2 >= starts_at
          AND $2 <= ends_at
          AND (max_redemptions IS NULL OR current_redemptions < max_redemptions)
        "#,
    )
    .bind(flash_sale_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "This promotion is no longer available".to_string(),
        ));
    }
    Ok(())
}
