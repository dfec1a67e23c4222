//! Redemption credential codec.
//!
//! A credential is the scannable proof of one ticket purchase. The token is
//! `tk1.<base64url(payload)>.<base64url(hmac)>` where the payload is a JSON
//! record of (purchase id, order id, issuance time) and the tag is an
//! HMAC-SHA256 over the encoded payload with a server-held key. Decoding
//! verifies the tag before trusting any field, so a payload edited on the
//! holder's device fails as `BadSignature`, not as an unknown ticket.
//!
//! The codec carries no authorization logic. Whether a decoded credential is
//! known, paid for, or already used is decided by `services::lifecycle`.

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use image::Luma;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "tk1";

/// Minimum rendered size in pixels. Level-H error correction plus a
/// generous module size keeps the code scannable on a glared phone screen.
const QR_MIN_DIMENSIONS: u32 = 240;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub purchase_id: Uuid,
    pub order_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Credential is not in the expected format")]
    Malformed,

    #[error("Credential signature does not verify")]
    BadSignature,

    #[error("Credential could not be rendered: {0}")]
    Render(String),
}

/// Encodes and decodes signed credential tokens and renders them as QR
/// images. Cheap to clone; the key is shared.
#[derive(Clone)]
pub struct CredentialCodec {
    key: Arc<Vec<u8>>,
}

impl CredentialCodec {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Arc::new(key.into()),
        }
    }

    /// Issues a signed token for one ticket purchase.
    pub fn encode(
        &self,
        purchase_id: Uuid,
        order_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        let payload = CredentialPayload {
            purchase_id,
            order_id,
            issued_at,
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| CredentialError::Render(e.to_string()))?;
        let encoded_body = URL_SAFE_NO_PAD.encode(&body);
        let tag = self.sign(encoded_body.as_bytes());
        Ok(format!(
            "{TOKEN_PREFIX}.{encoded_body}.{}",
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Parses and verifies a token. Structural problems are `Malformed`;
    /// a well-formed token whose tag does not verify is `BadSignature`.
    pub fn decode(&self, token: &str) -> Result<CredentialPayload, CredentialError> {
        let mut parts = token.split('.');
        let (prefix, body, tag) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(body), Some(tag), None) => (prefix, body, tag),
            _ => return Err(CredentialError::Malformed),
        };
        if prefix != TOKEN_PREFIX || body.is_empty() || tag.is_empty() {
            return Err(CredentialError::Malformed);
        }

        let tag_bytes = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| CredentialError::Malformed)?;

        // Constant-time verification before any field is trusted.
        let mut mac = self.mac();
        mac.update(body.as_bytes());
        mac.verify_slice(&tag_bytes)
            .map_err(|_| CredentialError::BadSignature)?;

        let body_bytes = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| CredentialError::Malformed)?;
        serde_json::from_slice(&body_bytes).map_err(|_| CredentialError::Malformed)
    }

    /// Renders a token as a PNG QR code (error-correction level H) and
    /// returns it as a data URI, ready to embed or email.
    pub fn render_qr(&self, token: &str) -> Result<String, CredentialError> {
        let code = QrCode::with_error_correction_level(token.as_bytes(), EcLevel::H)
            .map_err(|e| CredentialError::Render(e.to_string()))?;
        let img = code
            .render::<Luma<u8>>()
            .min_dimensions(QR_MIN_DIMENSIONS, QR_MIN_DIMENSIONS)
            .build();

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| CredentialError::Render(e.to_string()))?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).expect("HMAC key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new("test-signing-key".as_bytes())
    }

    #[test]
    fn roundtrip_preserves_identifiers_and_timestamp() {
        let c = codec();
        let purchase_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let issued_at = Utc::now();

        let token = c.encode(purchase_id, order_id, issued_at).unwrap();
        let payload = c.decode(&token).unwrap();

        assert_eq!(payload.purchase_id, purchase_id);
        assert_eq!(payload.order_id, order_id);
        assert_eq!(payload.issued_at, issued_at);
    }

    #[test]
    fn malformed_tokens_are_distinguished_from_bad_signatures() {
        let c = codec();

        assert_eq!(c.decode(""), Err(CredentialError::Malformed));
        assert_eq!(c.decode("tk1"), Err(CredentialError::Malformed));
        assert_eq!(c.decode("tk1.only-two"), Err(CredentialError::Malformed));
        assert_eq!(
            c.decode("tk1.a.b.extra-part"),
            Err(CredentialError::Malformed)
        );
        assert_eq!(
            c.decode("tk9.Zm9v.Zm9v"),
            Err(CredentialError::Malformed),
            "unknown prefix"
        );
        assert_eq!(
            c.decode("tk1.%%%.Zm9v"),
            Err(CredentialError::Malformed),
            "body is not base64url"
        );
    }

    #[test]
    fn edited_payload_fails_signature_not_lookup() {
        let c = codec();
        let token = c.encode(Uuid::new_v4(), Uuid::new_v4(), Utc::now()).unwrap();

        // Flip one character of the encoded payload.
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let mut body: Vec<u8> = parts[1].clone().into_bytes();
        body[0] = if body[0] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(body).unwrap();
        let tampered = parts.join(".");

        assert_eq!(c.decode(&tampered), Err(CredentialError::BadSignature));
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let token = CredentialCodec::new("other-key".as_bytes())
            .encode(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap();
        assert_eq!(codec().decode(&token), Err(CredentialError::BadSignature));
    }

    #[test]
    fn renders_a_png_data_uri() {
        let c = codec();
        let token = c.encode(Uuid::new_v4(), Uuid::new_v4(), Utc::now()).unwrap();
        let uri = c.render_qr(&token).unwrap();

        let b64 = uri
            .strip_prefix("data:image/png;base64,")
            .expect("data URI prefix");
        let png = STANDARD.decode(b64).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
