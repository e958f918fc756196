//! JWT issuing and validation

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::ApiError;

/// Token claims. `sub` is the account id; role mirrors the account record
/// at issue time and is re-checked against the store on tenant resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// HS256 token manager.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn issue(&self, account_id: Uuid, role: &str) -> Result<String, ApiError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: account_id,
            role: role.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + Duration::hours(self.expiry_hours)).unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode JWT");
            ApiError::Unauthorized
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                ApiError::Unauthorized
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_issue_and_validate_roundtrip() {
        let manager = JwtManager::new("test-secret", 24);
        let account_id = Uuid::new_v4();
        let token = manager.issue(account_id, "admin").unwrap();

        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.sub, account_id);
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtManager::new("secret-a", 24);
        let validator = JwtManager::new("secret-b", 24);
        let token = issuer.issue(Uuid::new_v4(), "employee").unwrap();
        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let manager = JwtManager::new("test-secret", 24);
        assert!(manager.validate("not.a.token").is_err());
    }
}
