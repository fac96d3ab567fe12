//! Task filing service.
//!
//! # Responsibility
//! - File tasks into workbaskets the caller may APPEND to.
//! - Snapshot the classification resolved in the workbasket domain.
//! - Load tasks and move them between states.
//!
//! # Invariants
//! - Classification data on a task never changes after filing.
//! - Tasks in a final state accept no other state.

use super::classification_service::resolve_with;
use super::workbasket_service::authorize;
use crate::db::Engine;
use crate::error::{CoreError, CoreResult};
use crate::model::access::PermissionSet;
use crate::model::classification::Classification;
use crate::model::generate_id;
use crate::model::task::{
    Attachment, ClassificationSummary, NewTask, Task, TaskState, ATTACHMENT_ID_PREFIX,
    TASK_ID_PREFIX,
};
use crate::repo::{
    RepoError, SqliteClassificationRepository, SqliteTaskRepository, SqliteWorkbasketRepository,
    TaskRepository, WorkbasketRepository,
};
use crate::security::IdentityContext;
use chrono::NaiveDateTime;
use log::info;

pub struct TaskService<'e> {
    engine: &'e Engine,
}

impl<'e> TaskService<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Files `request` into its workbasket.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank classification key, a due date before
    ///   the planned date, or a service level that overflows the due date.
    /// - `WorkbasketNotFound` / `NotAuthorized` (APPEND) for the workbasket.
    /// - `ClassificationNotFound` when a key does not resolve in the
    ///   workbasket domain.
    pub fn create_task(
        &self,
        request: NewTask,
        identity: &dyn IdentityContext,
    ) -> CoreResult<Task> {
        if request.classification_key.trim().is_empty() {
            return Err(CoreError::invalid_argument(
                "task classification key must not be blank",
            ));
        }
        if request
            .attachments
            .iter()
            .any(|attachment| attachment.classification_key.trim().is_empty())
        {
            return Err(CoreError::invalid_argument(
                "attachment classification key must not be blank",
            ));
        }

        let now = self.engine.now();
        let config = self.engine.config();
        let task = self.engine.run("task_create", |conn| {
            let workbasket = SqliteWorkbasketRepository::new(conn)
                .find_by_id(&request.workbasket_id)?
                .ok_or_else(|| CoreError::WorkbasketNotFound(request.workbasket_id.clone()))?;
            authorize(conn, config, &workbasket.key, PermissionSet::APPEND, identity)?;

            let classifications = SqliteClassificationRepository::new(conn);
            let classification =
                resolve_with(&classifications, &request.classification_key, &workbasket.domain)?;

            let planned = request.planned.unwrap_or(now);
            let due = match request.due {
                Some(due) if due < planned => {
                    return Err(CoreError::invalid_argument(format!(
                        "due {due} is before planned {planned}"
                    )));
                }
                Some(due) => due,
                None => due_from_service_level(planned, &classification)?,
            };

            let task_id = generate_id(TASK_ID_PREFIX);
            let mut attachments = Vec::with_capacity(request.attachments.len());
            for attachment in &request.attachments {
                let resolved = resolve_with(
                    &classifications,
                    &attachment.classification_key,
                    &workbasket.domain,
                )?;
                attachments.push(Attachment {
                    id: generate_id(ATTACHMENT_ID_PREFIX),
                    task_id: task_id.clone(),
                    created: now,
                    modified: now,
                    classification: summarize(&resolved),
                    object_reference: attachment.object_reference.clone(),
                    channel: attachment.channel.clone(),
                    received: attachment.received,
                    custom_attributes: attachment.custom_attributes.clone(),
                });
            }

            let task = Task {
                id: task_id,
                created: now,
                modified: now,
                planned,
                due,
                name: request.name.clone(),
                description: request.description.clone(),
                priority: classification.priority,
                state: TaskState::Ready,
                owner: request.owner.clone(),
                workbasket_id: workbasket.id.clone(),
                classification: summarize(&classification),
                primary_object_reference: request.primary_object_reference.clone(),
                attachments,
            };
            SqliteTaskRepository::new(conn).insert(&task)?;
            Ok(task)
        })?;

        info!(
            "event=task_created module=task status=ok id={} workbasket_id={} classification_key={} attachments={}",
            task.id,
            task.workbasket_id,
            task.classification.key,
            task.attachments.len()
        );
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> CoreResult<Task> {
        self.engine.run("task_get", |conn| {
            SqliteTaskRepository::new(conn)
                .find_by_id(id)?
                .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))
        })
    }

    /// Moves a task to `state`.
    ///
    /// # Errors
    /// - `TaskNotFound` for an unknown id.
    /// - `InvalidArgument` when the task is already in another final state.
    pub fn set_task_state(&self, id: &str, state: TaskState) -> CoreResult<Task> {
        let now = self.engine.now();
        self.engine.run("task_set_state", |conn| {
            let repo = SqliteTaskRepository::new(conn);
            let mut task = repo
                .find_by_id(id)?
                .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))?;
            if task.state.is_final() && task.state != state {
                return Err(CoreError::invalid_argument(format!(
                    "task {id} is {} and cannot become {state}",
                    task.state
                )));
            }
            repo.update_state(id, state, now).map_err(|err| match err {
                RepoError::NotFound { .. } => CoreError::TaskNotFound(id.to_string()),
                other => CoreError::from(other),
            })?;
            task.state = state;
            task.modified = now;
            Ok(task)
        })
    }
}

fn summarize(classification: &Classification) -> ClassificationSummary {
    ClassificationSummary {
        id: classification.id.clone(),
        key: classification.key.clone(),
        domain: classification.domain.clone(),
        category: classification.category.clone(),
    }
}

fn due_from_service_level(
    planned: NaiveDateTime,
    classification: &Classification,
) -> CoreResult<NaiveDateTime> {
    let service_level = classification
        .service_level_duration()
        .map_err(|err| CoreError::invalid_argument(err.to_string()))?;
    match service_level {
        None => Ok(planned),
        Some(duration) => planned.checked_add_signed(duration).ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "service level of classification `{}` overflows the due date",
                classification.key
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::due_from_service_level;
    use crate::model::classification::Classification;
    use chrono::{NaiveDate, TimeDelta};

    #[test]
    fn due_adds_service_level_to_planned() {
        let planned = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let mut classification = Classification::new("L10000", "");
        assert_eq!(
            due_from_service_level(planned, &classification).unwrap(),
            planned
        );

        classification.service_level = Some("P1DT2H".to_string());
        assert_eq!(
            due_from_service_level(planned, &classification).unwrap(),
            planned + TimeDelta::hours(26)
        );
    }
}
