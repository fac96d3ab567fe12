//! Workbasket access control model.
//!
//! # Responsibility
//! - Represent the permission vocabulary as a flag set.
//! - Map every permission to its storage column.
//!
//! # Invariants
//! - Each permission is an independent flag; "has all requested permissions"
//!   is a subset check.
//! - Access ids are stored as supplied; case normalization happens when
//!   filters are built.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Permissions an access entry can grant on a workbasket.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PermissionSet: u16 {
        const OPEN = 1 << 0;
        const READ = 1 << 1;
        const APPEND = 1 << 2;
        const TRANSFER = 1 << 3;
        const DISTRIBUTE = 1 << 4;
        const CUSTOM_1 = 1 << 5;
        const CUSTOM_2 = 1 << 6;
        const CUSTOM_3 = 1 << 7;
        const CUSTOM_4 = 1 << 8;
        const CUSTOM_5 = 1 << 9;
        const CUSTOM_6 = 1 << 10;
        const CUSTOM_7 = 1 << 11;
        const CUSTOM_8 = 1 << 12;
    }
}

const PERMISSION_COLUMNS: [(PermissionSet, &str); 13] = [
    (PermissionSet::OPEN, "perm_open"),
    (PermissionSet::READ, "perm_read"),
    (PermissionSet::APPEND, "perm_append"),
    (PermissionSet::TRANSFER, "perm_transfer"),
    (PermissionSet::DISTRIBUTE, "perm_distribute"),
    (PermissionSet::CUSTOM_1, "perm_custom_1"),
    (PermissionSet::CUSTOM_2, "perm_custom_2"),
    (PermissionSet::CUSTOM_3, "perm_custom_3"),
    (PermissionSet::CUSTOM_4, "perm_custom_4"),
    (PermissionSet::CUSTOM_5, "perm_custom_5"),
    (PermissionSet::CUSTOM_6, "perm_custom_6"),
    (PermissionSet::CUSTOM_7, "perm_custom_7"),
    (PermissionSet::CUSTOM_8, "perm_custom_8"),
];

impl PermissionSet {
    /// Storage column of every permission, in declaration order.
    pub fn columns() -> impl Iterator<Item = (PermissionSet, &'static str)> {
        PERMISSION_COLUMNS.into_iter()
    }

    /// Storage columns of the permissions contained in `self`.
    pub fn column_names(self) -> impl Iterator<Item = &'static str> {
        Self::columns()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, column)| column)
    }
}

/// Permissions granted to one access id on one workbasket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub workbasket_key: String,
    pub access_id: String,
    pub permissions: PermissionSet,
}

impl AccessControlEntry {
    pub fn new(
        workbasket_key: impl Into<String>,
        access_id: impl Into<String>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            workbasket_key: workbasket_key.into(),
            access_id: access_id.into(),
            permissions,
        }
    }

    /// Whether this entry grants every permission in `requested`.
    pub fn grants(&self, requested: PermissionSet) -> bool {
        self.permissions.contains(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessControlEntry, PermissionSet};

    #[test]
    fn every_permission_has_a_distinct_column() {
        let columns: Vec<_> = PermissionSet::columns().collect();
        assert_eq!(columns.len(), 13);
        let union = columns
            .iter()
            .fold(PermissionSet::empty(), |acc, (flag, _)| acc | *flag);
        assert_eq!(union, PermissionSet::all());
    }

    #[test]
    fn column_names_follow_requested_flags() {
        let names: Vec<_> = (PermissionSet::READ | PermissionSet::CUSTOM_8)
            .column_names()
            .collect();
        assert_eq!(names, vec!["perm_read", "perm_custom_8"]);
    }

    #[test]
    fn grants_requires_every_requested_permission() {
        let entry = AccessControlEntry::new(
            "GPK_KSC",
            "teamlead_1",
            PermissionSet::OPEN | PermissionSet::READ,
        );
        assert!(entry.grants(PermissionSet::READ));
        assert!(entry.grants(PermissionSet::OPEN | PermissionSet::READ));
        assert!(!entry.grants(PermissionSet::READ | PermissionSet::APPEND));
    }
}
