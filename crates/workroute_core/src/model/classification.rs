//! Classification domain model.
//!
//! # Responsibility
//! - Define the taxonomy entry used to classify tasks and attachments.
//! - Validate caller-supplied fields before persistence.
//!
//! # Invariants
//! - `(key, domain)` identifies a classification; `domain == ""` is the root.
//! - `parent_classification_key == ""` means no parent.
//! - `valid_until` defaults to `9999-12-31`.

use super::service_level::parse_service_level;
use super::{custom_slot, set_custom_slot, CustomFields};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Prefix of generated classification ids.
pub const CLASSIFICATION_ID_PREFIX: &str = "CLI";

/// Domain value of domain-independent root classifications.
pub const ROOT_DOMAIN: &str = "";

/// Open-ended validity end date.
pub fn default_valid_until() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Empty until the classification has been created.
    pub id: String,
    pub key: String,
    pub parent_classification_key: String,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub domain: String,
    pub is_valid_in_domain: bool,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: i32,
    /// ISO-8601 day-time duration, e.g. `P1D`.
    pub service_level: Option<String>,
    pub application_entry_point: Option<String>,
    pub custom: CustomFields,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: NaiveDate,
}

impl Classification {
    pub fn new(key: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            key: key.into(),
            parent_classification_key: String::new(),
            category: None,
            kind: None,
            domain: domain.into(),
            is_valid_in_domain: true,
            created: None,
            modified: None,
            name: None,
            description: None,
            priority: 0,
            service_level: None,
            application_entry_point: None,
            custom: CustomFields::default(),
            valid_from: None,
            valid_until: default_valid_until(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.domain == ROOT_DOMAIN
    }

    /// Custom field `number` in `1..=10`.
    pub fn custom_field(&self, number: usize) -> Option<&str> {
        custom_slot(&self.custom, number)
    }

    /// Sets custom field `number`; returns `false` when out of range.
    pub fn set_custom_field(&mut self, number: usize, value: Option<String>) -> bool {
        set_custom_slot(&mut self.custom, number, value)
    }

    /// Parsed service level, `None` when unset or blank.
    pub fn service_level_duration(
        &self,
    ) -> Result<Option<TimeDelta>, ClassificationValidationError> {
        match self.service_level.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_service_level(value).map(Some).map_err(|_| {
                ClassificationValidationError::InvalidServiceLevel(value.to_string())
            }),
        }
    }

    /// Checks caller-controlled fields.
    pub fn validate(&self) -> Result<(), ClassificationValidationError> {
        if self.key.trim().is_empty() {
            return Err(ClassificationValidationError::BlankKey);
        }
        if let Some(duration) = self.service_level_duration()? {
            if duration < TimeDelta::zero() {
                return Err(ClassificationValidationError::NegativeServiceLevel(
                    self.service_level.clone().unwrap_or_default(),
                ));
            }
        }
        if let Some(valid_from) = self.valid_from {
            if valid_from > self.valid_until {
                return Err(ClassificationValidationError::InvertedValidity {
                    valid_from,
                    valid_until: self.valid_until,
                });
            }
        }
        Ok(())
    }

    /// Copy of this classification for the root domain, without id or timestamps.
    pub fn root_copy(&self) -> Self {
        Self {
            id: String::new(),
            domain: ROOT_DOMAIN.to_string(),
            created: None,
            modified: None,
            ..self.clone()
        }
    }
}

/// Field-level validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationValidationError {
    BlankKey,
    InvalidServiceLevel(String),
    /// Service levels must not move the due date before the planned date.
    NegativeServiceLevel(String),
    InvertedValidity {
        valid_from: NaiveDate,
        valid_until: NaiveDate,
    },
}

impl Display for ClassificationValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankKey => write!(f, "classification key must not be blank"),
            Self::InvalidServiceLevel(value) => write!(
                f,
                "invalid service level `{value}`; expected an ISO-8601 duration such as P1D"
            ),
            Self::NegativeServiceLevel(value) => {
                write!(f, "service level `{value}` must not be negative")
            }
            Self::InvertedValidity {
                valid_from,
                valid_until,
            } => write!(
                f,
                "valid_from {valid_from} is after valid_until {valid_until}"
            ),
        }
    }
}

impl Error for ClassificationValidationError {}

/// Classification together with its children in the same domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationNode {
    pub classification: Classification,
    pub children: Vec<ClassificationNode>,
}

impl ClassificationNode {
    /// Number of classifications in this subtree, including the node itself.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ClassificationNode::subtree_size)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::{default_valid_until, Classification, ClassificationValidationError};
    use chrono::NaiveDate;

    #[test]
    fn new_classification_has_defaults() {
        let classification = Classification::new("K1", "DOMAIN_A");
        assert!(classification.id.is_empty());
        assert!(classification.is_valid_in_domain);
        assert_eq!(classification.parent_classification_key, "");
        assert_eq!(classification.valid_until, default_valid_until());
        assert!(!classification.is_root());
        assert!(Classification::new("K1", "").is_root());
    }

    #[test]
    fn validate_rejects_blank_key_and_bad_service_level() {
        assert_eq!(
            Classification::new("  ", "").validate(),
            Err(ClassificationValidationError::BlankKey)
        );

        let mut classification = Classification::new("K1", "");
        classification.service_level = Some("ASAP".to_string());
        assert!(matches!(
            classification.validate(),
            Err(ClassificationValidationError::InvalidServiceLevel(_))
        ));

        classification.service_level = Some("P2D".to_string());
        assert_eq!(classification.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_negative_service_level() {
        let mut classification = Classification::new("K1", "");
        classification.service_level = Some("-P2D".to_string());
        assert_eq!(
            classification.validate(),
            Err(ClassificationValidationError::NegativeServiceLevel(
                "-P2D".to_string()
            ))
        );

        classification.service_level = Some("PT0S".to_string());
        assert_eq!(classification.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_inverted_validity() {
        let mut classification = Classification::new("K1", "");
        classification.valid_until = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        classification.valid_from = NaiveDate::from_ymd_opt(2021, 1, 1);
        assert!(matches!(
            classification.validate(),
            Err(ClassificationValidationError::InvertedValidity { .. })
        ));
    }

    #[test]
    fn root_copy_clears_identity() {
        let mut classification = Classification::new("K1", "DOMAIN_A");
        classification.id = "CLI:1".to_string();
        classification.category = Some("EXTERN".to_string());
        let root = classification.root_copy();
        assert!(root.id.is_empty());
        assert!(root.is_root());
        assert_eq!(root.category.as_deref(), Some("EXTERN"));
    }

    #[test]
    fn serializes_kind_as_type() {
        let mut classification = Classification::new("K1", "");
        classification.kind = Some("TASK".to_string());
        let json = serde_json::to_value(&classification).unwrap();
        assert_eq!(json["type"], "TASK");
    }
}
