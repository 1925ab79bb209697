//! Salary grade → role derivation.

use crate::Role;

/// Grade codes that carry approval authority.
pub const APPROVER_GRADES: [&str; 5] = ["A.1.", "A.2.", "A.3.", "A.4.", "A.5."];

/// Map a directory salary grade to a role.
///
/// Surrounding whitespace is ignored; the comparison is otherwise exact and
/// case-sensitive. Anything else, including a missing grade, is `User`.
pub fn derive_role(salary_grade: Option<&str>) -> Role {
    match salary_grade.map(str::trim) {
        Some(grade) if APPROVER_GRADES.contains(&grade) => Role::Approver,
        _ => Role::User,
    }
}
