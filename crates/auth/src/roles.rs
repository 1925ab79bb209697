use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use gatepass_core::DomainError;

/// Authorization tag drawn from a fixed vocabulary.
///
/// Declaration order is the canonical order used by [`RoleSet`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    User,
    Approver,
    Verifier,
    Pleader,
    Dispatcher,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::User,
        Role::Approver,
        Role::Verifier,
        Role::Pleader,
        Role::Dispatcher,
        Role::Admin,
        Role::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Approver => "Approver",
            Role::Verifier => "Verifier",
            Role::Pleader => "Pleader",
            Role::Dispatcher => "Dispatcher",
            Role::Admin => "Admin",
            Role::SuperAdmin => "SuperAdmin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    /// Exact, case-sensitive match on the canonical name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::unknown("role", s))
    }
}

/// Ordered set of roles held by one user.
///
/// Union is the only way roles accumulate; nothing in the identity core
/// removes a role from a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn single(role: Role) -> Self {
        Self(BTreeSet::from([role]))
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    /// Add every role of `other` to `self`.
    pub fn union_with(&mut self, other: &RoleSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn union(&self, other: &RoleSet) -> RoleSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// True when at least one role is shared.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.iter().any(|r| other.0.contains(r))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// First role in canonical order, used where a single role is displayed.
    pub fn primary(&self) -> Option<Role> {
        self.0.iter().next().copied()
    }

    /// `self`, or `{User}` when empty. Login responses always carry at least
    /// one role.
    pub fn or_default_user(&self) -> RoleSet {
        if self.is_empty() {
            RoleSet::single(Role::User)
        } else {
            self.clone()
        }
    }

    pub fn to_vec(&self) -> Vec<Role> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(value: [Role; N]) -> Self {
        value.into_iter().collect()
    }
}

impl IntoIterator for RoleSet {
    type Item = Role;
    type IntoIter = std::collections::btree_set::IntoIter<Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names_only() {
        assert_eq!("SuperAdmin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!("superadmin".parse::<Role>().is_err());
        assert!("Owner".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_as_canonical_name() {
        assert_eq!(serde_json::to_string(&Role::Approver).unwrap(), "\"Approver\"");
        let set = RoleSet::from([Role::Admin, Role::User]);
        assert_eq!(serde_json::to_string(&set).unwrap(), "[\"User\",\"Admin\"]");
    }

    #[test]
    fn union_never_drops_roles() {
        let stored = RoleSet::from([Role::Dispatcher]);
        let derived = RoleSet::single(Role::Approver);
        let merged = stored.union(&derived);
        assert!(merged.contains(Role::Dispatcher));
        assert!(merged.contains(Role::Approver));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn union_is_idempotent() {
        let mut set = RoleSet::from([Role::User, Role::Approver]);
        set.union_with(&RoleSet::single(Role::User));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn intersects_is_any_overlap() {
        let held = RoleSet::from([Role::Approver, Role::User]);
        assert!(held.intersects(&RoleSet::from([Role::Admin, Role::Approver])));
        assert!(!held.intersects(&RoleSet::from([Role::Dispatcher])));
        assert!(!held.intersects(&RoleSet::new()));
    }

    #[test]
    fn empty_set_defaults_to_user() {
        assert_eq!(RoleSet::new().or_default_user(), RoleSet::single(Role::User));
        let admin = RoleSet::single(Role::Admin);
        assert_eq!(admin.or_default_user(), admin);
    }
}
