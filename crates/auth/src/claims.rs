use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use clipforge_core::OwnerId;

/// JWT claims model (transport-agnostic).
///
/// The minimal set of claims the API expects once a token has been decoded
/// and signature-verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the authenticated owner.
    pub sub: OwnerId,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token is malformed or its signature is invalid")]
    Invalid,
}

/// Deterministically validate JWT claims.
///
/// Note: this validates the *claims* only. Signature verification / decoding
/// is the validator's job.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_offset: i64, expires_offset: i64, now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: OwnerId::new(),
            issued_at: now + Duration::seconds(issued_offset),
            expires_at: now + Duration::seconds(expires_offset),
        }
    }

    #[test]
    fn accepts_a_live_token() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(-60, 60, now), now), Ok(()));
    }

    #[test]
    fn rejects_expired_and_future_tokens() {
        let now = Utc::now();
        assert_eq!(
            validate_claims(&claims(-120, -60, now), now),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims(60, 120, now), now),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&claims(60, 60, now), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
