//! Caller identity for authorization-scoped operations.
//!
//! # Responsibility
//! - Supply the access ids (user id plus group principals) of the caller.
//! - Normalize access ids according to engine configuration.
//!
//! # Invariants
//! - Identity is always an explicit parameter; the core keeps no ambient
//!   "current user" state.
//! - Normalization trims ids, drops blanks and removes duplicates while
//!   keeping first-seen order.

use std::collections::BTreeSet;

/// Source of the access ids an operation is authorized with.
pub trait IdentityContext {
    fn access_ids(&self) -> Vec<String>;
}

/// Group membership of a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPrincipal {
    groups: BTreeSet<String>,
}

impl GroupPrincipal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `group`; returns `false` when it was already present.
    pub fn add(&mut self, group: impl Into<String>) -> bool {
        self.groups.insert(group.into())
    }

    pub fn remove(&mut self, group: &str) -> bool {
        self.groups.remove(group)
    }

    pub fn is_member(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }
}

/// Authenticated caller: a user id plus its group principals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    user_id: String,
    groups: GroupPrincipal,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            groups: GroupPrincipal::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.add(group);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn groups(&self) -> &GroupPrincipal {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupPrincipal {
        &mut self.groups
    }
}

impl IdentityContext for CallerIdentity {
    fn access_ids(&self) -> Vec<String> {
        std::iter::once(self.user_id.as_str())
            .chain(self.groups.iter())
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Fixed list of access ids, e.g. for service accounts.
impl IdentityContext for Vec<String> {
    fn access_ids(&self) -> Vec<String> {
        self.clone()
    }
}

/// Name of the SQL function that applies [`fold_access_id`] to stored ids.
pub(crate) const FOLD_ACCESS_ID_SQL_FN: &str = "fold_access_id";

/// Case folding applied to access ids when matching case-insensitively.
///
/// Storage queries call the same function as the SQL function
/// `fold_access_id`, so both sides of a comparison fold identically,
/// non-ASCII letters included.
pub fn fold_access_id(id: &str) -> String {
    id.to_lowercase()
}

/// Trims, optionally lowercases and de-duplicates access ids.
pub fn normalize_access_ids<I, S>(ids: I, lowercase: bool) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    for id in ids {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = if lowercase {
            fold_access_id(trimmed)
        } else {
            trimmed.to_string()
        };
        if seen.insert(value.clone()) {
            normalized.push(value);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::{fold_access_id, normalize_access_ids, CallerIdentity, IdentityContext};

    #[test]
    fn caller_identity_lists_user_then_groups() {
        let caller = CallerIdentity::new("teamlead_1")
            .with_group("group_2")
            .with_group("group_1");
        assert_eq!(
            caller.access_ids(),
            vec!["teamlead_1", "group_1", "group_2"]
        );
        assert!(caller.groups().is_member("group_1"));
    }

    #[test]
    fn blank_user_contributes_no_access_id() {
        assert!(CallerIdentity::new(" ").access_ids().is_empty());
    }

    #[test]
    fn normalization_lowercases_and_deduplicates() {
        let ids = normalize_access_ids(["User_1", " user_1 ", "", "Group_A"], true);
        assert_eq!(ids, vec!["user_1", "group_a"]);

        let ids = normalize_access_ids(["User_1", "user_1"], false);
        assert_eq!(ids, vec!["User_1", "user_1"]);
    }

    #[test]
    fn folding_covers_non_ascii_letters() {
        assert_eq!(fold_access_id("Ölaf"), "ölaf");
        assert_eq!(normalize_access_ids(["ÖLAF", "ölaf"], true), vec!["ölaf"]);
    }
}
