//! Task repository: filed tasks, attachments and monitoring aggregates.
//!
//! # Responsibility
//! - Persist tasks together with their attachments.
//! - Run the fixed aggregate queries behind task monitoring.
//!
//! # Invariants
//! - A task and its attachments are written in one savepoint.
//! - Due-date thresholds compare calendar days, not timestamps.
//! - An empty state list applies no state constraint.

use super::{date_value, RepoError, RepoResult, SqlFilter};
use crate::db::with_savepoint;
use crate::model::task::{
    Attachment, ClassificationSummary, DueWorkbasketCount, ObjectReference, Task, TaskState,
    TaskStateCount,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    created,
    modified,
    planned,
    due,
    name,
    description,
    priority,
    state,
    owner,
    workbasket_id,
    classification_id,
    classification_key,
    classification_domain,
    classification_category,
    por_company,
    por_system,
    por_system_instance,
    por_type,
    por_value
FROM tasks";

const ATTACHMENT_SELECT_SQL: &str = "SELECT
    id,
    task_id,
    created,
    modified,
    classification_id,
    classification_key,
    classification_domain,
    classification_category,
    ref_company,
    ref_system,
    ref_system_instance,
    ref_type,
    ref_value,
    channel,
    received,
    custom_attributes
FROM attachments";

pub trait TaskRepository {
    fn insert(&self, task: &Task) -> RepoResult<()>;
    /// Loads a task with its attachments.
    fn find_by_id(&self, id: &str) -> RepoResult<Option<Task>>;
    fn update_state(&self, id: &str, state: TaskState, modified: NaiveDateTime)
        -> RepoResult<()>;
    /// Observed states only, in `TaskState` order.
    fn count_by_state(&self, states: &[TaskState]) -> RepoResult<Vec<TaskStateCount>>;
    fn count_due_in_workbasket(
        &self,
        workbasket_id: &str,
        threshold: NaiveDate,
        states: &[TaskState],
    ) -> RepoResult<u64>;
    /// Grouped by workbasket, ordered by workbasket id.
    fn count_due_by_workbasket(
        &self,
        threshold: NaiveDate,
        states: &[TaskState],
    ) -> RepoResult<Vec<DueWorkbasketCount>>;
}

pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn attachments_of(&self, task_id: &str) -> RepoResult<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ATTACHMENT_SELECT_SQL} WHERE task_id = ?1 ORDER BY created ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([task_id])?;
        let mut attachments = Vec::new();
        while let Some(row) = rows.next()? {
            attachments.push(parse_attachment_row(row)?);
        }
        Ok(attachments)
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn insert(&self, task: &Task) -> RepoResult<()> {
        with_savepoint(self.conn, "insert_task", |conn| {
            let por = task.primary_object_reference.as_ref();
            conn.execute(
                "INSERT INTO tasks (
                    id, created, modified, planned, due, name, description, priority,
                    state, owner, workbasket_id, classification_id, classification_key,
                    classification_domain, classification_category, por_company, por_system,
                    por_system_instance, por_type, por_value
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                          ?16, ?17, ?18, ?19, ?20);",
                params![
                    task.id,
                    task.created,
                    task.modified,
                    task.planned,
                    task.due,
                    task.name,
                    task.description,
                    task.priority,
                    task.state.as_str(),
                    task.owner,
                    task.workbasket_id,
                    task.classification.id,
                    task.classification.key,
                    task.classification.domain,
                    task.classification.category,
                    por.map(|r| r.company.as_str()),
                    por.map(|r| r.system.as_str()),
                    por.map(|r| r.system_instance.as_str()),
                    por.map(|r| r.kind.as_str()),
                    por.map(|r| r.value.as_str()),
                ],
            )?;

            let mut stmt = conn.prepare(
                "INSERT INTO attachments (
                    id, task_id, created, modified, classification_id, classification_key,
                    classification_domain, classification_category, ref_company, ref_system,
                    ref_system_instance, ref_type, ref_value, channel, received,
                    custom_attributes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                          ?16);",
            )?;
            for attachment in &task.attachments {
                let custom_attributes = serde_json::to_string(&attachment.custom_attributes)
                    .map_err(|err| {
                        RepoError::InvalidData(format!(
                            "attachment custom attributes are not serializable: {err}"
                        ))
                    })?;
                let reference = &attachment.object_reference;
                stmt.execute(params![
                    attachment.id,
                    task.id,
                    attachment.created,
                    attachment.modified,
                    attachment.classification.id,
                    attachment.classification.key,
                    attachment.classification.domain,
                    attachment.classification.category,
                    reference.company,
                    reference.system,
                    reference.system_instance,
                    reference.kind,
                    reference.value,
                    attachment.channel,
                    attachment.received,
                    custom_attributes,
                ])?;
            }
            Ok(())
        })
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Task>> {
        let task = self
            .conn
            .query_row(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"), [id], |row| {
                Ok(parse_task_row(row))
            })
            .optional()?
            .transpose()?;

        match task {
            Some(mut task) => {
                task.attachments = self.attachments_of(&task.id)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    fn update_state(
        &self,
        id: &str,
        state: TaskState,
        modified: NaiveDateTime,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET state = ?1, modified = ?2 WHERE id = ?3;",
            params![state.as_str(), modified, id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "task",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn count_by_state(&self, states: &[TaskState]) -> RepoResult<Vec<TaskStateCount>> {
        let mut predicates = SqlFilter::new();
        predicates.any_of("state", state_values(states));
        let mut sql = String::from("SELECT state, COUNT(*) AS task_count FROM tasks");
        predicates.write_where(&mut sql);
        sql.push_str(" GROUP BY state;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(predicates.into_binds()))?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let state_text: String = row.get("state")?;
            let state = parse_state(&state_text)?;
            counts.push(TaskStateCount {
                state,
                count: count_column(row)?,
            });
        }
        counts.sort_by_key(|entry| entry.state);
        Ok(counts)
    }

    fn count_due_in_workbasket(
        &self,
        workbasket_id: &str,
        threshold: NaiveDate,
        states: &[TaskState],
    ) -> RepoResult<u64> {
        let mut predicates = SqlFilter::new();
        predicates.compare("workbasket_id", "=", Some(Value::Text(workbasket_id.to_string())));
        predicates.compare("date(due)", ">=", Some(date_value(threshold)));
        predicates.any_of("state", state_values(states));
        let mut sql = String::from("SELECT COUNT(*) AS task_count FROM tasks");
        predicates.write_where(&mut sql);

        self.conn
            .query_row(&sql, params_from_iter(predicates.into_binds()), |row| {
                Ok(count_column(row))
            })?
    }

    fn count_due_by_workbasket(
        &self,
        threshold: NaiveDate,
        states: &[TaskState],
    ) -> RepoResult<Vec<DueWorkbasketCount>> {
        let mut predicates = SqlFilter::new();
        predicates.compare("date(due)", ">=", Some(date_value(threshold)));
        predicates.any_of("state", state_values(states));
        let mut sql = String::from("SELECT workbasket_id, COUNT(*) AS task_count FROM tasks");
        predicates.write_where(&mut sql);
        sql.push_str(" GROUP BY workbasket_id ORDER BY workbasket_id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(predicates.into_binds()))?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            counts.push(DueWorkbasketCount {
                workbasket_id: row.get("workbasket_id")?,
                count: count_column(row)?,
            });
        }
        Ok(counts)
    }
}

fn state_values(states: &[TaskState]) -> Vec<Value> {
    states
        .iter()
        .map(|state| Value::Text(state.as_str().to_string()))
        .collect()
}

fn parse_state(value: &str) -> RepoResult<TaskState> {
    TaskState::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task state `{value}` in tasks.state"))
    })
}

fn count_column(row: &Row<'_>) -> RepoResult<u64> {
    let count: i64 = row.get("task_count")?;
    u64::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count `{count}`")))
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let state_text: String = row.get("state")?;
    let company: Option<String> = row.get("por_company")?;
    let primary_object_reference = match company {
        Some(company) => Some(ObjectReference {
            company,
            system: row.get::<_, Option<String>>("por_system")?.unwrap_or_default(),
            system_instance: row
                .get::<_, Option<String>>("por_system_instance")?
                .unwrap_or_default(),
            kind: row.get::<_, Option<String>>("por_type")?.unwrap_or_default(),
            value: row.get::<_, Option<String>>("por_value")?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Task {
        id: row.get("id")?,
        created: row.get("created")?,
        modified: row.get("modified")?,
        planned: row.get("planned")?,
        due: row.get("due")?,
        name: row.get("name")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        state: parse_state(&state_text)?,
        owner: row.get("owner")?,
        workbasket_id: row.get("workbasket_id")?,
        classification: ClassificationSummary {
            id: row.get("classification_id")?,
            key: row.get("classification_key")?,
            domain: row.get("classification_domain")?,
            category: row.get("classification_category")?,
        },
        primary_object_reference,
        attachments: Vec::new(),
    })
}

fn parse_attachment_row(row: &Row<'_>) -> RepoResult<Attachment> {
    let id: String = row.get("id")?;
    let raw_attributes: String = row.get("custom_attributes")?;
    let custom_attributes: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&raw_attributes).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid custom attributes for attachment `{id}`: {err}"
            ))
        })?;

    Ok(Attachment {
        task_id: row.get("task_id")?,
        created: row.get("created")?,
        modified: row.get("modified")?,
        classification: ClassificationSummary {
            id: row.get("classification_id")?,
            key: row.get("classification_key")?,
            domain: row.get("classification_domain")?,
            category: row.get("classification_category")?,
        },
        object_reference: ObjectReference {
            company: row.get("ref_company")?,
            system: row.get("ref_system")?,
            system_instance: row.get("ref_system_instance")?,
            kind: row.get("ref_type")?,
            value: row.get("ref_value")?,
        },
        channel: row.get("channel")?,
        received: row.get("received")?,
        custom_attributes,
        id,
    })
}

