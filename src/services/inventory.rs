//! Inventory ledger for ticket-tier capacity.
//!
//! Availability is a contended counter; both mutations here are single
//! conditional UPDATE statements whose row count tells us whether the
//! guard held. There is no read-modify-write anywhere: two concurrent
//! reservations can never both observe the same stale availability.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Atomically takes `quantity` units off a tier's availability.
///
/// Must run inside the purchase transaction. When the decrement does not
/// apply, the remaining count is re-read (still inside the transaction) so
/// the caller gets a reason precise enough to act on.
pub async fn reserve(
    conn: &mut PgConnection,
    tier_id: Uuid,
    quantity: i32,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET available_quantity = available_quantity - $2,
            updated_at = now()
        WHERE id = $1 AND available_quantity >= $2
        "#,
    )
    .bind(tier_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let remaining: Option<i32> =
        sqlx::query_scalar("SELECT available_quantity FROM ticket_tiers WHERE id = $1")
            .bind(tier_id)
            .fetch_optional(&mut *conn)
            .await?;

    Err(match remaining {
        None => AppError::NotFound(format!("Ticket tier {tier_id} was not found")),
        Some(0) => AppError::Conflict("This ticket tier is sold out".to_string()),
        Some(n) => AppError::Conflict(format!("Only {n} ticket(s) remain for this tier")),
    })
}

/// Returns units to a tier, e.g. after a refund. Clamped to the tier's
/// total so a double release can never inflate capacity.
pub async fn release(
    conn: &mut PgConnection,
    tier_id: Uuid,
    quantity: i32,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET available_quantity = LEAST(available_quantity + $2, total_quantity),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(tier_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Ticket tier {tier_id} was not found"
        )));
    }
    Ok(())
}
