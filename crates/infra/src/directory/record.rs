//! Wire shapes of the employee directory API.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One employee as the directory returns it.
///
/// Only the fields the identity core reads are typed; everything else is
/// kept verbatim in `extra` for the audit snapshot. Numeric values are
/// accepted wherever a string is expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    #[serde(rename = "EMPLOYEE_NUMBER", default, deserialize_with = "lenient_string")]
    pub employee_number: Option<String>,
    #[serde(rename = "EMPLOYEE_TITLE", default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(rename = "EMPLOYEE_FIRST_NAME", default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(rename = "EMPLOYEE_SURNAME", default, deserialize_with = "lenient_string")]
    pub surname: Option<String>,
    #[serde(rename = "EMPLOYEE_DESIGNATION", default, deserialize_with = "lenient_string")]
    pub designation: Option<String>,
    #[serde(rename = "EMPLOYEE_SECTION", default, deserialize_with = "lenient_string")]
    pub section: Option<String>,
    #[serde(rename = "EMPLOYEE_DIVISION", default, deserialize_with = "lenient_string")]
    pub division: Option<String>,
    #[serde(rename = "EMPLOYEE_GROUP_NAME", default, deserialize_with = "lenient_string")]
    pub group_name: Option<String>,
    #[serde(rename = "EMPLOYEE_MOBILE_PHONE", default, deserialize_with = "lenient_string")]
    pub mobile_phone: Option<String>,
    #[serde(rename = "EMPLOYEE_OFFICE_PHONE", default, deserialize_with = "lenient_string")]
    pub office_phone: Option<String>,
    #[serde(rename = "EMPLOYEE_OFFICIAL_EMAIL", default, deserialize_with = "lenient_string")]
    pub official_email: Option<String>,
    #[serde(rename = "EMPLOYEE_SALARY_GRADE", default, deserialize_with = "lenient_string")]
    pub salary_grade: Option<String>,
    /// Service number of the immediate supervisor.
    #[serde(rename = "EMPLOYEE_IMM_ES_SERVICE_NO", default, deserialize_with = "lenient_string")]
    pub immediate_supervisor: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DirectoryRecord {
    /// Full record as JSON, for the profile's audit snapshot.
    pub fn snapshot(&self) -> Option<Value> {
        serde_json::to_value(self).ok()
    }
}

/// `{ isSuccess, dataBundle }` envelope shared by every endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub is_success: Option<bool>,
    pub data_bundle: Option<T>,
}

/// `dataBundle` of a successful `POST /common/authenticate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBundle {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<DirectoryUser>,
    #[serde(default)]
    pub expires_in: Option<Value>,
}

/// User block of the authentication response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DirectoryUser {
    /// The directory marks its administrators with the role text `admin`.
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.trim().eq_ignore_ascii_case("admin"))
    }
}

/// Outcome of a successful directory authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorySession {
    /// The directory's own token, handed back to the client untouched.
    pub token: String,
    pub user: DirectoryUser,
    pub expires_in: Option<Value>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn typed_and_extra_fields_are_both_kept() {
        let record: DirectoryRecord = serde_json::from_value(json!({
            "EMPLOYEE_NUMBER": 12345,
            "EMPLOYEE_FIRST_NAME": "Jane",
            "EMPLOYEE_SALARY_GRADE": "A.3.",
            "NIC_NUMBER": "901234567V",
            "EMPLOYEE_TITLE": null
        }))
        .unwrap();

        assert_eq!(record.employee_number.as_deref(), Some("12345"));
        assert_eq!(record.first_name.as_deref(), Some("Jane"));
        assert_eq!(record.title, None);
        assert_eq!(record.surname, None);
        assert_eq!(record.extra["NIC_NUMBER"], "901234567V");

        let snapshot = record.snapshot().unwrap();
        assert_eq!(snapshot["EMPLOYEE_SALARY_GRADE"], "A.3.");
        assert_eq!(snapshot["NIC_NUMBER"], "901234567V");
    }

    #[test]
    fn envelope_tolerates_missing_parts() {
        let env: Envelope<Vec<DirectoryRecord>> = serde_json::from_value(json!({})).unwrap();
        assert!(env.is_success.is_none());
        assert!(env.data_bundle.is_none());
    }

    #[test]
    fn admin_role_text_is_case_insensitive() {
        let user = DirectoryUser {
            role: Some("Admin".into()),
            ..Default::default()
        };
        assert!(user.is_admin());
        assert!(!DirectoryUser::default().is_admin());
    }
}
