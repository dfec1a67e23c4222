use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

/// A priced class of admission with its own capacity pool.
///
/// `available_quantity` is never written by application-side arithmetic;
/// every mutation goes through a conditional UPDATE (see
/// `services::inventory`), so `0 <= available_quantity <= total_quantity`
/// holds at all times.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub max_per_purchase: i32,
    pub group_min_quantity: Option<i32>,
    pub group_discount_percent: Option<Decimal>,
    pub sales_start_time: Option<DateTime<Utc>>,
    pub sales_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    /// Rejects purchases outside the configured sales window. Tiers with no
    /// window configured sell at any time.
    pub fn ensure_sales_open(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(start) = self.sales_start_time {
            if now < start {
                return Err(AppError::Conflict(format!(
                    "Sales for '{}' have not opened yet",
                    self.name
                )));
            }
        }
        if let Some(end) = self.sales_end_time {
            if now > end {
                return Err(AppError::Conflict(format!(
                    "Sales for '{}' have closed",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn ensure_quantity_allowed(&self, quantity: i32) -> Result<(), AppError> {
        if quantity < 1 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        if quantity > self.max_per_purchase {
            return Err(AppError::ValidationError(format!(
                "At most {} tickets may be bought in one purchase",
                self.max_per_purchase
            )));
        }
        Ok(())
    }

    /// Group discount applies when the purchase meets the configured
    /// threshold; tiers without a threshold never discount.
    pub fn group_discount_for(&self, quantity: i32) -> Option<Decimal> {
        match (self.group_min_quantity, self.group_discount_percent) {
            (Some(min), Some(percent)) if quantity >= min => Some(percent),
            _ => None,
        }
    }
}

/// One individually redeemable admission, tied to one attendee.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketPurchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub ticket_tier_id: Uuid,
    pub event_id: Uuid,
    pub status: TicketStatus,
    /// The signed credential token this instance was issued with.
    pub credential: String,
    /// Rendered QR image (PNG data URI) for the credential.
    pub qr_code: Option<String>,
    pub purchased_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a single admission: active until redeemed at the gate,
/// refunded through the refund workflow, or (historically) marked
/// transferred. Used and refunded are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Active,
    Used,
    Transferred,
    Refunded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tier(sales_start: Option<i64>, sales_end: Option<i64>) -> TicketTier {
        let now = Utc::now();
        TicketTier {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "Regular".to_string(),
            description: None,
            price: Decimal::new(2500, 2),
            total_quantity: 100,
            available_quantity: 100,
            max_per_purchase: 6,
            group_min_quantity: Some(5),
            group_discount_percent: Some(Decimal::new(10, 0)),
            sales_start_time: sales_start.map(|s| now + Duration::seconds(s)),
            sales_end_time: sales_end.map(|s| now + Duration::seconds(s)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sales_window_is_enforced_when_configured() {
        let now = Utc::now();

        assert!(tier(None, None).ensure_sales_open(now).is_ok());
        assert!(tier(Some(-60), Some(60)).ensure_sales_open(now).is_ok());

        let not_open = tier(Some(60), Some(120)).ensure_sales_open(now);
        assert!(matches!(not_open, Err(AppError::Conflict(_))));

        let closed = tier(Some(-120), Some(-60)).ensure_sales_open(now);
        assert!(matches!(closed, Err(AppError::Conflict(_))));
    }

    #[test]
    fn quantity_bounds_are_enforced() {
        let t = tier(None, None);

        assert!(t.ensure_quantity_allowed(1).is_ok());
        assert!(t.ensure_quantity_allowed(6).is_ok());
        assert!(matches!(
            t.ensure_quantity_allowed(0),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            t.ensure_quantity_allowed(7),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn group_discount_requires_threshold() {
        let t = tier(None, None);

        assert_eq!(t.group_discount_for(4), None);
        assert_eq!(t.group_discount_for(5), Some(Decimal::new(10, 0)));

        let mut no_group = tier(None, None);
        no_group.group_min_quantity = None;
        no_group.group_discount_percent = None;
        assert_eq!(no_group.group_discount_for(10), None);
    }
}
