//! Task monitoring aggregates.
//!
//! # Invariants
//! - `threshold = today - days_in_past` in calendar days; zero means today and
//!   negative values move the threshold into the future.
//! - Offsets that do not fit a calendar date fail with `InvalidArgument`.
//! - An empty state list counts tasks in every state.

use crate::db::Engine;
use crate::error::{CoreError, CoreResult};
use crate::model::task::{DueWorkbasketCount, TaskState, TaskStateCount};
use crate::repo::{SqliteTaskRepository, TaskRepository};
use chrono::{NaiveDate, TimeDelta};
use log::debug;

/// Earliest due day counted for `days_in_past`.
pub fn due_threshold(today: NaiveDate, days_in_past: i64) -> CoreResult<NaiveDate> {
    TimeDelta::try_days(days_in_past)
        .and_then(|offset| today.checked_sub_signed(offset))
        .ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "days_in_past {days_in_past} is out of the supported date range"
            ))
        })
}

pub struct TaskMonitorService<'e> {
    engine: &'e Engine,
}

impl<'e> TaskMonitorService<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Task counts per observed state, in state order.
    pub fn count_by_state(&self, states: &[TaskState]) -> CoreResult<Vec<TaskStateCount>> {
        let counts = self.engine.run("monitor_count_by_state", |conn| {
            SqliteTaskRepository::new(conn)
                .count_by_state(states)
                .map_err(CoreError::from)
        })?;
        debug!(
            "event=monitor_counted module=monitor status=ok operation=count_by_state groups={}",
            counts.len()
        );
        Ok(counts)
    }

    /// Tasks in `workbasket_id` in `states` due on or after the threshold.
    pub fn count_for_workbasket_since(
        &self,
        workbasket_id: &str,
        days_in_past: i64,
        states: &[TaskState],
    ) -> CoreResult<u64> {
        let threshold = due_threshold(self.engine.today(), days_in_past)?;
        self.engine.run("monitor_count_for_workbasket", |conn| {
            SqliteTaskRepository::new(conn)
                .count_due_in_workbasket(workbasket_id, threshold, states)
                .map_err(CoreError::from)
        })
    }

    /// Per-workbasket counts with the same threshold, ordered by workbasket id.
    pub fn count_by_workbasket_since(
        &self,
        days_in_past: i64,
        states: &[TaskState],
    ) -> CoreResult<Vec<DueWorkbasketCount>> {
        let threshold = due_threshold(self.engine.today(), days_in_past)?;
        let counts = self.engine.run("monitor_count_by_workbasket", |conn| {
            SqliteTaskRepository::new(conn)
                .count_due_by_workbasket(threshold, states)
                .map_err(CoreError::from)
        })?;
        debug!(
            "event=monitor_counted module=monitor status=ok operation=count_by_workbasket threshold={} groups={}",
            threshold,
            counts.len()
        );
        Ok(counts)
    }
}
