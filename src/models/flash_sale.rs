use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

/// A time-boxed discount with a bounded redemption counter.
///
/// `current_redemptions` is incremented only through the conditional UPDATE
/// in `services::promo::redeem`, which checks the cap in the same statement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FlashSale {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub discount_percent: Decimal,
    pub promo_code: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub max_redemptions: Option<i32>,
    pub current_redemptions: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlashSale {
    pub fn is_exhausted(&self) -> bool {
        match self.max_redemptions {
            Some(max) => self.current_redemptions >= max,
            None => false,
        }
    }

    /// Read-side redeemability check, used to give callers a precise reason
    /// before checkout. The purchase transaction re-checks all of this
    /// atomically in `services::promo::redeem`; this method is advisory.
    pub fn ensure_redeemable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.is_active {
            return Err(AppError::Conflict(format!(
                "Promotion '{}' is not active",
                self.name
            )));
        }
        if now < self.starts_at {
            return Err(AppError::Conflict(format!(
                "Promotion '{}' has not started yet",
                self.name
            )));
        }
        if now > self.ends_at {
            return Err(AppError::Conflict(format!(
                "Promotion '{}' has ended",
                self.name
            )));
        }
        if self.is_exhausted() {
            return Err(AppError::Conflict(format!(
                "Promotion '{}' has been fully redeemed",
                self.name
            )));
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sale() -> FlashSale {
        let now = Utc::now();
        FlashSale {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "Early bird".to_string(),
            discount_percent: Decimal::new(20, 0),
            promo_code: Some("EARLY20".to_string()),
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            is_active: true,
            max_redemptions: Some(3),
            current_redemptions: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn redeemable_inside_window_with_capacity() {
        assert!(sale().ensure_redeemable(Utc::now()).is_ok());
    }

    #[test]
    fn inactive_sale_is_rejected() {
        let mut s = sale();
        s.is_active = false;
        assert!(matches!(
            s.ensure_redeemable(Utc::now()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn window_edges_are_rejected() {
        let s = sale();
        assert!(matches!(
            s.ensure_redeemable(s.starts_at - Duration::seconds(1)),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            s.ensure_redeemable(s.ends_at + Duration::seconds(1)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn exhausted_cap_is_rejected_and_uncapped_never_is() {
        let mut s = sale();
        s.current_redemptions = 3;
        assert!(s.is_exhausted());
        assert!(matches!(
            s.ensure_redeemable(Utc::now()),
            Err(AppError::Conflict(_))
        ));

        s.max_redemptions = None;
        s.current_redemptions = 1_000_000;
        assert!(!s.is_exhausted());
        assert!(s.ensure_redeemable(Utc::now()).is_ok());
    }
}
