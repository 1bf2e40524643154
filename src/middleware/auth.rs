//! Handshake credential verification.
//!
//! The connection's bearer credential is checked structurally (three
//! dot-separated segments) before any signature work, then verified as an
//! HS256 JWT. The `sub` claim carries the user identity; its absence is a
//! distinct failure from a malformed token. Token issuance lives elsewhere,
//! this service only validates.

use crate::error::{AppError, AppResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Subject: user id as a UUID string. Optional so a signed token
    /// without an identity claim fails with `InvalidCredentialPayload`
    /// rather than a decode error.
    pub sub: Option<String>,
    pub exp: i64,
}

/// Validate a raw credential and extract the authenticated user id.
pub fn verify_credential(token: &str, secret: &str) -> AppResult<Uuid> {
    if token.split('.').count() != 3 {
        return Err(AppError::InvalidCredentialFormat);
    }

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::InvalidCredentialFormat)?;

    let sub = data.claims.sub.ok_or(AppError::InvalidCredentialPayload)?;
    Uuid::parse_str(&sub).map_err(|_| AppError::InvalidCredentialPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: Option<String>,
        exp: i64,
    }

    fn sign(sub: Option<String>) -> String {
        let claims = TestClaims {
            sub,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_credential_yields_user_id() {
        let user = Uuid::new_v4();
        let token = sign(Some(user.to_string()));
        assert_eq!(verify_credential(&token, SECRET).unwrap(), user);
    }

    #[test]
    fn structurally_invalid_credential_is_rejected_before_verification() {
        assert_eq!(
            verify_credential("not-a-jwt", SECRET).unwrap_err(),
            AppError::InvalidCredentialFormat
        );
        assert_eq!(
            verify_credential("only.two", SECRET).unwrap_err(),
            AppError::InvalidCredentialFormat
        );
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let token = sign(Some(Uuid::new_v4().to_string()));
        assert_eq!(
            verify_credential(&token, "other-secret").unwrap_err(),
            AppError::InvalidCredentialFormat
        );
    }

    #[test]
    fn missing_identity_claim_is_a_payload_error() {
        let token = sign(None);
        assert_eq!(
            verify_credential(&token, SECRET).unwrap_err(),
            AppError::InvalidCredentialPayload
        );
    }

    #[test]
    fn non_uuid_identity_claim_is_a_payload_error() {
        let token = sign(Some("john_doe".into()));
        assert_eq!(
            verify_credential(&token, SECRET).unwrap_err(),
            AppError::InvalidCredentialPayload
        );
    }
}
