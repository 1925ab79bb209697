//! Session token issuing and verification (HS256).

use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};

use gatepass_core::{Clock, ServiceNo, SystemClock};

use crate::claims::{SessionClaims, TokenError, validate_claims};

/// Default validity window of a session.
pub const DEFAULT_SESSION_VALIDITY_DAYS: i64 = 30;

/// Mints and verifies signed session tokens.
///
/// The time window is checked against the injected [`Clock`], not the
/// library's own view of "now", so expiry is testable.
pub struct SessionIssuer<C: Clock = SystemClock> {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    validity: Duration,
    clock: C,
}

impl SessionIssuer<SystemClock> {
    pub fn new(secret: &[u8], validity: Duration) -> Self {
        Self::with_clock(secret, validity, SystemClock)
    }
}

impl<C: Clock> SessionIssuer<C> {
    pub fn with_clock(secret: &[u8], validity: Duration, clock: C) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            validity,
            clock,
        }
    }

    pub fn issue(&self, service_no: &ServiceNo) -> Result<String, TokenError> {
        let claims = SessionClaims::new(service_no.clone(), self.clock.now(), self.validity);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and time window; return the service number claim.
    pub fn verify(&self, token: &str) -> Result<ServiceNo, TokenError> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })?;

        validate_claims(&data.claims, self.clock.now())?;
        Ok(data.claims.service_no)
    }
}

impl<C: Clock> core::fmt::Debug for SessionIssuer<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gatepass_core::ManualClock;

    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn issuer() -> (SessionIssuer<ManualClock>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let issuer = SessionIssuer::with_clock(
            SECRET,
            Duration::days(DEFAULT_SESSION_VALIDITY_DAYS),
            clock.clone(),
        );
        (issuer, clock)
    }

    fn sn(s: &str) -> ServiceNo {
        ServiceNo::parse(s).unwrap()
    }

    #[test]
    fn verify_returns_issued_service_no() {
        let (issuer, _) = issuer();
        for id in ["123456", "API_USER", "someone@corp.example"] {
            let token = issuer.issue(&sn(id)).unwrap();
            assert_eq!(issuer.verify(&token).unwrap(), sn(id));
        }
    }

    #[test]
    fn tampered_payload_fails() {
        let (issuer, _) = issuer();
        let token = issuer.issue(&sn("123456")).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let payload = parts[1];
        let mid = payload.len() / 2;
        let original = payload.as_bytes()[mid];
        let replacement = if original == b'A' { 'B' } else { 'A' };
        let mut mutated = payload.to_string();
        mutated.replace_range(mid..mid + 1, &replacement.to_string());

        let forged = format!("{}.{}.{}", parts[0], mutated, parts[2]);
        assert!(issuer.verify(&forged).is_err());
    }

    #[test]
    fn foreign_secret_is_bad_signature() {
        let (issuer, clock) = issuer();
        let other = SessionIssuer::with_clock(b"other-secret", Duration::days(30), clock);
        let token = other.issue(&sn("123456")).unwrap();
        assert_eq!(issuer.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn expires_after_validity_window() {
        let (issuer, clock) = issuer();
        let token = issuer.issue(&sn("123456")).unwrap();

        clock.advance(Duration::days(29));
        assert!(issuer.verify(&token).is_ok());

        clock.advance(Duration::days(1) + Duration::seconds(1));
        assert_eq!(issuer.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let (issuer, _) = issuer();
        assert_eq!(issuer.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(issuer.verify(""), Err(TokenError::Malformed));
    }
}
