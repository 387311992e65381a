//! HS256 token decoding and verification.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use clipforge_core::OwnerId;

use crate::claims::{validate_claims, JwtClaims, TokenValidationError};

/// Verifies a bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Standard numeric-date wire shape of the token payload.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: OwnerId,
    iat: i64,
    exp: i64,
}

/// HS256 validator over a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }

    fn decode(&self, token: &str) -> Result<JwtClaims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time-window checks are done by validate_claims against the
        // caller-supplied clock; decode only verifies the signature.
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let data = jsonwebtoken::decode::<WireClaims>(token, &self.key, &validation)
            .map_err(|_| TokenValidationError::Invalid)?;

        let issued_at = Utc
            .timestamp_opt(data.claims.iat, 0)
            .single()
            .ok_or(TokenValidationError::Invalid)?;
        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or(TokenValidationError::Invalid)?;

        Ok(JwtClaims {
            sub: data.claims.sub,
            issued_at,
            expires_at,
        })
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let claims = self.decode(token)?;
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
