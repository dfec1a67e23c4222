//! Wallet-signature login: message format, freshness window, replay guard.
//!
//! A captured signature+nonce pair is useless to an attacker because the
//! nonce is single-use (see `services::replay`) and the signed message
//! embeds an issuance timestamp that must be within the freshness window.
//! The message format is matched exactly; anything looser would let a
//! signature obtained for one purpose be replayed for login.
//!
//! The signature scheme itself (which curve, how addresses are derived) is
//! deployment-specific and plugged in through [`SignatureVerifier`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::models::User;
use crate::services::replay;
use crate::utils::error::AppError;

/// Domain string baked into every login message.
pub const LOGIN_DOMAIN: &str = "tessera.events";

/// Signed-message timestamps older (or newer) than this are rejected.
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

/// Nonce TTL. Must be at least the freshness window, so a nonce can never
/// be purged while the message that carries it would still be accepted.
pub const NONCE_TTL_SECS: i64 = 600;

/// Verifies a wallet signature over a raw message. Implementations live at
/// the deployment boundary (or in tests).
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, wallet_address: &str, message: &str, signature: &str) -> bool;
}

/// The exact message a wallet is asked to sign for login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginMessage {
    pub wallet_address: String,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

impl LoginMessage {
    pub fn new(wallet_address: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            nonce: replay::issue_nonce(),
            issued_at,
        }
    }

    /// Renders the canonical five-line message presented to the wallet.
    pub fn render(&self) -> String {
        format!(
            "{LOGIN_DOMAIN} wants you to sign in with your wallet:\n{}\n\nNonce: {}\nIssued At: {}",
            self.wallet_address,
            self.nonce,
            self.issued_at.to_rfc3339(),
        )
    }

    /// Strict inverse of [`render`](Self::render): the line count, the
    /// header, the blank separator and both field prefixes must all match.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let malformed =
            || AppError::ValidationError("Login message does not match the expected format".to_string());

        let lines: Vec<&str> = text.split('\n').collect();
        let [header, address, blank, nonce_line, issued_line] = lines.as_slice() else {
            return Err(malformed());
        };

        if *header != format!("{LOGIN_DOMAIN} wants you to sign in with your wallet:")
            || address.is_empty()
            || !blank.is_empty()
        {
            return Err(malformed());
        }

        let nonce = nonce_line.strip_prefix("Nonce: ").ok_or_else(malformed)?;
        let issued_raw = issued_line
            .strip_prefix("Issued At: ")
            .ok_or_else(malformed)?;
        if nonce.is_empty() {
            return Err(malformed());
        }
        let issued_at = DateTime::parse_from_rfc3339(issued_raw)
            .map_err(|_| malformed())?
            .with_timezone(&Utc);

        Ok(Self {
            wallet_address: (*address).to_string(),
            nonce: nonce.to_string(),
            issued_at,
        })
    }

    /// Rejects messages whose timestamp falls outside the freshness window
    /// in either direction.
    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        let skew = (now - self.issued_at).num_seconds().abs();
        if skew > MAX_TIMESTAMP_SKEW_SECS {
            return Err(AppError::AuthError(format!(
                "Login message timestamp is outside the {MAX_TIMESTAMP_SKEW_SECS}s window"
            )));
        }
        Ok(())
    }
}

/// Full login check: format, freshness, signature, replay, account lookup.
/// The nonce is only consumed once everything cheaper has passed, so a
/// garbled request cannot burn a victim's challenge.
pub async fn verify_login(
    pool: &PgPool,
    verifier: &dyn SignatureVerifier,
    raw_message: &str,
    signature: &str,
    now: DateTime<Utc>,
) -> Result<User, AppError> {
    let message = LoginMessage::parse(raw_message)?;
    message.ensure_fresh(now)?;

    if !verifier.verify(&message.wallet_address, raw_message, signature) {
        return Err(AppError::AuthError(
            "Signature does not verify for this wallet".to_string(),
        ));
    }

    if !replay::consume(pool, &message.nonce, NONCE_TTL_SECS).await? {
        return Err(AppError::AuthError(
            "Login nonce has already been used".to_string(),
        ));
    }

    let user: Option<User> = sqlx::query_as(
        r#"
        SELECT id, name, email, wallet_address, created_at, updated_at
        FROM users
        WHERE wallet_address = $1
        "#,
    )
    .bind(&message.wallet_address)
    .fetch_optional(pool)
    .await?;

    let user = user.ok_or_else(|| {
        AppError::NotFound("No account is linked to this wallet".to_string())
    })?;

    info!(user_id = %user.id, "Wallet login verified");
    Ok(user)
}
