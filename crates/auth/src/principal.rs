//! Join-key derivation for federated identities.
//!
//! The identity provider never hands us an employee number directly. It is
//! recovered from the user principal name (e.g. `012345@corp.example`), and
//! when that fails the principal name itself becomes the join key.

use std::sync::LazyLock;

use regex::Regex;

use gatepass_core::{DomainError, ServiceNo};

/// Number of digits in an employee number.
pub const SERVICE_NO_DIGITS: usize = 6;

static SERVICE_NO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{6}").expect("valid service number pattern"));

/// First run of six consecutive digits in `principal_name`.
///
/// Longer digit runs yield their first six digits.
pub fn extract_service_no(principal_name: &str) -> Option<ServiceNo> {
    SERVICE_NO_PATTERN
        .find(principal_name)
        .and_then(|m| ServiceNo::parse(m.as_str()).ok())
}

/// Identity asserted by the identity provider, reduced to what the
/// reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub principal_name: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    /// Employee number recovered from the principal name, if any.
    pub service_no: Option<ServiceNo>,
    join_key: ServiceNo,
}

impl FederatedIdentity {
    pub fn new(
        principal_name: impl Into<String>,
        display_name: Option<String>,
        mail: Option<String>,
    ) -> Result<Self, DomainError> {
        let principal_name = principal_name.into().trim().to_string();
        if principal_name.is_empty() {
            return Err(DomainError::validation("principal name is empty"));
        }
        let service_no = extract_service_no(&principal_name);
        let join_key = match &service_no {
            Some(sn) => sn.clone(),
            None => ServiceNo::parse(&principal_name)?,
        };
        Ok(Self {
            principal_name,
            display_name,
            mail,
            service_no,
            join_key,
        })
    }

    /// Key used to find or create the local profile: the service number, or
    /// the principal name when none could be extracted.
    pub fn join_key(&self) -> &ServiceNo {
        &self.join_key
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn extracts_six_digits() {
        assert_eq!(extract_service_no("012345@corp.example").unwrap().as_str(), "012345");
        assert_eq!(extract_service_no("emp.987654.x@corp").unwrap().as_str(), "987654");
    }

    #[test]
    fn first_six_of_a_longer_run() {
        assert_eq!(extract_service_no("1234567@corp").unwrap().as_str(), "123456");
    }

    #[test]
    fn short_runs_do_not_match() {
        assert_eq!(extract_service_no("jane.doe@corp.example"), None);
        assert_eq!(extract_service_no("12345@corp"), None);
        assert_eq!(extract_service_no(""), None);
    }

    #[test]
    fn join_key_falls_back_to_principal_name() {
        let id = FederatedIdentity::new("jane.doe@corp.example", None, None).unwrap();
        assert_eq!(id.service_no, None);
        assert_eq!(id.join_key().as_str(), "jane.doe@corp.example");

        let id = FederatedIdentity::new("123456@corp.example", None, None).unwrap();
        assert_eq!(id.join_key().as_str(), "123456");
    }

    #[test]
    fn blank_principal_is_rejected() {
        assert!(FederatedIdentity::new("  ", None, None).is_err());
    }

    proptest! {
        #[test]
        fn extracted_value_is_six_digits_from_input(s in ".*") {
            if let Some(sn) = extract_service_no(&s) {
                prop_assert_eq!(sn.as_str().len(), SERVICE_NO_DIGITS);
                prop_assert!(sn.as_str().chars().all(|c| c.is_ascii_digit()));
                prop_assert!(s.contains(sn.as_str()));
            }
        }
    }
}
