//! Task, attachment and monitoring result models.
//!
//! # Responsibility
//! - Define filed tasks with their classification snapshot.
//! - Define attachments and the business object references they carry.
//! - Define aggregate rows produced by task monitoring.
//!
//! # Invariants
//! - A task belongs to exactly one workbasket.
//! - The classification of a task or attachment is captured at filing time;
//!   later classification edits do not change it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub const TASK_ID_PREFIX: &str = "TKI";
pub const ATTACHMENT_ID_PREFIX: &str = "TAI";

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Ready,
    Claimed,
    Completed,
    Terminated,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Ready,
        TaskState::Claimed,
        TaskState::Completed,
        TaskState::Terminated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Claimed => "CLAIMED",
            Self::Completed => "COMPLETED",
            Self::Terminated => "TERMINATED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "READY" => Some(Self::Ready),
            "CLAIMED" => Some(Self::Claimed),
            "COMPLETED" => Some(Self::Completed),
            "TERMINATED" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Completed and terminated tasks accept no further transitions.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compound pointer to a business object in an external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub company: String,
    pub system: String,
    pub system_instance: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ObjectReference {
    pub fn new(
        company: impl Into<String>,
        system: impl Into<String>,
        system_instance: impl Into<String>,
        kind: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            system: system.into(),
            system_instance: system_instance.into(),
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Classification reference captured on a task or attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub id: String,
    pub key: String,
    pub domain: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub task_id: String,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub classification: ClassificationSummary,
    pub object_reference: ObjectReference,
    pub channel: Option<String>,
    pub received: Option<NaiveDateTime>,
    pub custom_attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub planned: NaiveDateTime,
    pub due: NaiveDateTime,
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: i32,
    pub state: TaskState,
    pub owner: Option<String>,
    pub workbasket_id: String,
    pub classification: ClassificationSummary,
    pub primary_object_reference: Option<ObjectReference>,
    pub attachments: Vec<Attachment>,
}

/// Attachment supplied when filing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttachment {
    /// Resolved in the domain of the target workbasket.
    pub classification_key: String,
    pub object_reference: ObjectReference,
    pub channel: Option<String>,
    pub received: Option<NaiveDateTime>,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, serde_json::Value>,
}

/// Request to file a new task into a workbasket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub workbasket_id: String,
    /// Resolved in the domain of the target workbasket.
    pub classification_key: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    /// Defaults to the filing time.
    pub planned: Option<NaiveDateTime>,
    /// Defaults to `planned` plus the classification service level.
    pub due: Option<NaiveDateTime>,
    pub primary_object_reference: Option<ObjectReference>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

impl NewTask {
    pub fn new(workbasket_id: impl Into<String>, classification_key: impl Into<String>) -> Self {
        Self {
            workbasket_id: workbasket_id.into(),
            classification_key: classification_key.into(),
            name: None,
            description: None,
            owner: None,
            planned: None,
            due: None,
            primary_object_reference: None,
            attachments: Vec::new(),
        }
    }
}

/// Number of tasks observed in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStateCount {
    pub state: TaskState,
    pub count: u64,
}

/// Number of due tasks in one workbasket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueWorkbasketCount {
    pub workbasket_id: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::TaskState;

    #[test]
    fn state_names_round_trip() {
        for state in TaskState::ALL {
            assert_eq!(TaskState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TaskState::parse("ready"), None);
    }

    #[test]
    fn only_completed_and_terminated_are_final() {
        assert!(!TaskState::Ready.is_final());
        assert!(!TaskState::Claimed.is_final());
        assert!(TaskState::Completed.is_final());
        assert!(TaskState::Terminated.is_final());
    }

    #[test]
    fn state_serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_string(&TaskState::Claimed).unwrap(),
            "\"CLAIMED\""
        );
    }
}
