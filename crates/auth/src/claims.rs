use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatepass_core::ServiceNo;

/// Session token claims.
///
/// The only identity claim is the service number. Roles are deliberately
/// absent: every request re-resolves the profile, so a long-lived token never
/// carries stale privileges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "serviceNo")]
    pub service_no: ServiceNo,

    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(service_no: ServiceNo, issued_at: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            service_no,
            iat: issued_at.timestamp(),
            exp: (issued_at + validity).timestamp(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token could not be signed: {0}")]
    Signing(String),
}

/// Clock skew tolerated on `iat` only; expiry is exact.
pub const ISSUED_AT_LEEWAY_SECS: i64 = 60;

/// Deterministically validate the time window of decoded claims.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now + ISSUED_AT_LEEWAY_SECS < claims.iat {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_at(now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::new(ServiceNo::parse("123456").unwrap(), now, Duration::days(30))
    }

    #[test]
    fn fresh_claims_are_valid() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims_at(now), now), Ok(()));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let claims = claims_at(now);
        let at_expiry = now + Duration::days(30);
        assert_eq!(validate_claims(&claims, at_expiry), Err(TokenError::Expired));
        assert_eq!(validate_claims(&claims, at_expiry - Duration::seconds(1)), Ok(()));
    }

    #[test]
    fn future_issue_is_rejected_beyond_leeway() {
        let now = Utc::now();
        let claims = claims_at(now + Duration::minutes(5));
        assert_eq!(validate_claims(&claims, now), Err(TokenError::NotYetValid));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let mut claims = claims_at(now);
        claims.exp = claims.iat;
        assert_eq!(validate_claims(&claims, now), Err(TokenError::InvalidTimeWindow));
    }

    #[test]
    fn wire_name_is_service_no() {
        let json = serde_json::to_value(claims_at(Utc::now())).unwrap();
        assert_eq!(json["serviceNo"], "123456");
        assert!(json.get("roles").is_none());
    }
}
