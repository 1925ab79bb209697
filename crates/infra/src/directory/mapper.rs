//! Translation of directory records into the internal profile vocabulary.
//!
//! This is the only place that knows the directory's field names.

use serde::Serialize;

use gatepass_auth::{ProfileUpdate, Role, RoleSet, UserProfile, derive_role};
use gatepass_core::ServiceNo;

use super::record::DirectoryRecord;

/// Profile-shaped fields extracted from one directory record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryProfile {
    pub service_no: Option<ServiceNo>,
    pub name: Option<String>,
    pub designation: Option<String>,
    pub section: Option<String>,
    pub group: Option<String>,
    pub contact_no: Option<String>,
    pub email: Option<String>,
    pub salary_grade: Option<String>,
    pub supervisor_service_no: Option<ServiceNo>,
    pub snapshot: Option<serde_json::Value>,
}

impl DirectoryProfile {
    /// Role implied by the salary grade.
    pub fn derived_role(&self) -> Role {
        derive_role(self.salary_grade.as_deref())
    }

    /// Partial update carrying every present field. Adds no roles.
    pub fn to_update(&self) -> ProfileUpdate {
        ProfileUpdate {
            name: self.name.clone(),
            designation: self.designation.clone(),
            section: self.section.clone(),
            group: self.group.clone(),
            contact_no: self.contact_no.clone(),
            email: self.email.clone(),
            directory_snapshot: self.snapshot.clone(),
            supervisor_service_no: self.supervisor_service_no.clone(),
            ..ProfileUpdate::default()
        }
    }

    /// Update that also grants the grade-derived role.
    pub fn to_update_with_derived_role(&self) -> ProfileUpdate {
        self.to_update()
            .with_roles(RoleSet::single(self.derived_role()))
    }
}

/// Map a record. Total: missing or blank fields stay `None`.
pub fn map_record(record: &DirectoryRecord) -> DirectoryProfile {
    DirectoryProfile {
        service_no: present(&record.employee_number).and_then(|v| ServiceNo::parse(v).ok()),
        name: join_name(&[&record.title, &record.first_name, &record.surname]),
        designation: present(&record.designation),
        section: present(&record.section).or_else(|| present(&record.division)),
        group: present(&record.group_name),
        contact_no: present(&record.mobile_phone).or_else(|| present(&record.office_phone)),
        email: present(&record.official_email),
        salary_grade: present(&record.salary_grade),
        supervisor_service_no: present(&record.immediate_supervisor).and_then(|v| ServiceNo::parse(v).ok()),
        snapshot: record.snapshot(),
    }
}

/// One entry of a supervisor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorView {
    pub service_no: Option<String>,
    pub name: Option<String>,
    pub designation: Option<String>,
    pub section: Option<String>,
    pub division: Option<String>,
    pub email: Option<String>,
    pub contact_no: Option<String>,
    pub salary_grade: Option<String>,
}

impl SupervisorView {
    /// Supervisor known only from the local store.
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            service_no: Some(profile.service_no.to_string()),
            name: profile.name.clone(),
            designation: profile.designation.clone(),
            section: profile.section.clone(),
            division: None,
            email: profile.email.clone(),
            contact_no: profile.contact_no.clone(),
            salary_grade: None,
        }
    }
}

/// Supervisor entries keep section and division apart.
pub fn map_supervisor(record: &DirectoryRecord) -> SupervisorView {
    SupervisorView {
        service_no: present(&record.employee_number),
        name: join_name(&[&record.title, &record.first_name, &record.surname]),
        designation: present(&record.designation),
        section: present(&record.section),
        division: present(&record.division),
        email: present(&record.official_email),
        contact_no: present(&record.mobile_phone).or_else(|| present(&record.office_phone)),
        salary_grade: present(&record.salary_grade),
    }
}

/// Trimmed value, `None` when absent or blank.
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn join_name(parts: &[&Option<String>]) -> Option<String> {
    let joined = parts
        .iter()
        .filter_map(|p| present(p))
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}
