//! Replay guard: a single-use nonce store with TTL expiry.
//!
//! The existence check and the mark-as-consumed write are one statement
//! (`INSERT ... ON CONFLICT DO NOTHING`), so two requests carrying the same
//! nonce can never both see it as fresh, regardless of how many service
//! instances are running.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::PgPool;
use tracing::debug;

use crate::utils::error::AppError;

/// Generates a fresh 128-bit nonce for a login challenge.
pub fn issue_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Marks a nonce consumed. Returns `true` if it was fresh, `false` if it
/// had been seen before (a replay).
///
/// An existing-but-expired row also counts as consumed; rows only leave the
/// table through [`purge_expired`], and the caller's TTL must cover the
/// whole window in which the surrounding proof (e.g. a signed login
/// message) is still accepted.
pub async fn consume(pool: &PgPool, nonce: &str, ttl_seconds: i64) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO wallet_nonces (nonce, expires_at)
        VALUES ($1, $2)
        ON CONFLICT (nonce) DO NOTHING
        "#,
    )
    .bind(nonce)
    .bind(Utc::now() + Duration::seconds(ttl_seconds))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Drops nonces past their TTL. Run periodically; returns how many rows
/// were removed.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM wallet_nonces WHERE expires_at < now()")
        .execute(pool)
        .await?;

    let purged = result.rows_affected();
    if purged > 0 {
        debug!(purged, "Purged expired nonces");
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique_and_urlsafe() {
        let a = issue_nonce();
        let b = issue_nonce();

        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), 16);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }
}
