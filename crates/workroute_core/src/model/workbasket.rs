//! Workbasket domain model.
//!
//! # Invariants
//! - `id` is generated on create and prefixed with `WBI`.
//! - `key` is unique across all workbaskets.

use super::{custom_slot, set_custom_slot, CustomFields};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const WORKBASKET_ID_PREFIX: &str = "WBI";

/// Number of organisational level columns.
pub const ORG_LEVEL_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkbasketType {
    Group,
    Personal,
    Topic,
    Clearance,
}

impl WorkbasketType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "GROUP",
            Self::Personal => "PERSONAL",
            Self::Topic => "TOPIC",
            Self::Clearance => "CLEARANCE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GROUP" => Some(Self::Group),
            "PERSONAL" => Some(Self::Personal),
            "TOPIC" => Some(Self::Topic),
            "CLEARANCE" => Some(Self::Clearance),
            _ => None,
        }
    }
}

impl Display for WorkbasketType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named queue into which tasks are filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbasket {
    pub id: String,
    pub key: String,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub name: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub kind: WorkbasketType,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub custom: CustomFields,
    pub org_levels: [Option<String>; ORG_LEVEL_COUNT],
}

impl Workbasket {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
        kind: WorkbasketType,
    ) -> Self {
        Self {
            id: String::new(),
            key: key.into(),
            created: None,
            modified: None,
            name: name.into(),
            domain: domain.into(),
            kind,
            description: None,
            owner: None,
            custom: CustomFields::default(),
            org_levels: Default::default(),
        }
    }

    pub fn custom_field(&self, number: usize) -> Option<&str> {
        custom_slot(&self.custom, number)
    }

    pub fn set_custom_field(&mut self, number: usize, value: Option<String>) -> bool {
        set_custom_slot(&mut self.custom, number, value)
    }

    /// Org level `number` in `1..=4`.
    pub fn org_level(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.org_levels.get(index))
            .and_then(|value| value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::{Workbasket, WorkbasketType};

    #[test]
    fn type_names_round_trip() {
        for kind in [
            WorkbasketType::Group,
            WorkbasketType::Personal,
            WorkbasketType::Topic,
            WorkbasketType::Clearance,
        ] {
            assert_eq!(WorkbasketType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(WorkbasketType::parse("group"), None);
    }

    #[test]
    fn org_levels_are_one_based() {
        let mut workbasket = Workbasket::new("GPK", "Group", "DOMAIN_A", WorkbasketType::Group);
        workbasket.org_levels[3] = Some("team".to_string());
        assert_eq!(workbasket.org_level(4), Some("team"));
        assert_eq!(workbasket.org_level(0), None);
        assert_eq!(workbasket.org_level(5), None);
    }
}
