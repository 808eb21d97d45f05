//! HS256 access tokens
//!
//! Tokens carry the user id as `sub` and must be issued by
//! [`JWT_ISSUER`](tubely_core::constants::JWT_ISSUER).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tubely_core::constants::JWT_ISSUER;
use tubely_core::AppError;
use uuid::Uuid;

use crate::auth::models::JwtClaims;

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[JWT_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for `user_id` valid for `expires_in`.
    pub fn issue_token(&self, user_id: Uuid, expires_in: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            iss: JWT_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Validate signature, issuer and expiry and return the user id.
    pub fn validate_token(&self, token: &str) -> Result<Uuid, AppError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
        Ok(data.claims.sub)
    }
}
