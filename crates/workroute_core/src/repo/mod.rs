//! Storage port: repository contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define typed repository traits consumed by services and query builders.
//! - Translate filter values into parameterized SQL inside this boundary.
//!
//! # Invariants
//! - SQL text never contains caller-supplied values; every value is bound.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Unique-constraint violations surface as `RepoError::Duplicate`.

use crate::db::DbError;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod classification_repo;
pub mod task_repo;
pub mod workbasket_repo;

pub use classification_repo::{
    ClassificationFilter, ClassificationRepository, SqliteClassificationRepository,
};
pub use task_repo::{SqliteTaskRepository, TaskRepository};
pub use workbasket_repo::{
    PermissionFilter, SqliteWorkbasketRepository, WorkbasketFilter, WorkbasketRepository,
};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: String },
    /// A unique constraint rejected the write.
    Duplicate(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Duplicate(message) => write!(f, "duplicate row: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::Duplicate(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if is_unique_violation(&value) {
            return Self::Duplicate(value.to_string());
        }
        Self::Db(DbError::Sqlite(value))
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

/// Bounded result window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }
}

/// Accumulates `AND`-joined predicates and their bind values.
#[derive(Debug, Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    binds: Vec<Value>,
}

impl SqlFilter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `column IN (...)`; no clause when `values` is empty.
    pub(crate) fn any_of<I>(&mut self, column: &str, values: I)
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let start = self.binds.len();
        self.binds.extend(values.into_iter().map(Into::into));
        let count = self.binds.len() - start;
        if count > 0 {
            self.clauses
                .push(format!("{column} IN ({})", placeholders(count)));
        }
    }

    /// `column LIKE ?` with the pattern passed through verbatim.
    pub(crate) fn like(&mut self, column: &str, pattern: Option<&str>) {
        if let Some(pattern) = pattern {
            self.clauses.push(format!("{column} LIKE ?"));
            self.binds.push(Value::Text(pattern.to_string()));
        }
    }

    /// `column <op> ?` when `value` is set.
    pub(crate) fn compare(&mut self, column: &str, op: &str, value: Option<Value>) {
        if let Some(value) = value {
            self.clauses.push(format!("{column} {op} ?"));
            self.binds.push(value);
        }
    }

    /// Adds a raw predicate that binds `binds` in order.
    pub(crate) fn raw(&mut self, clause: String, binds: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause);
        self.binds.extend(binds);
    }

    /// Appends ` WHERE ...` (when any clause exists) to `sql`.
    pub(crate) fn write_where(&self, sql: &mut String) {
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
    }

    pub(crate) fn into_binds(self) -> Vec<Value> {
        self.binds
    }
}

/// Appends `LIMIT`/`OFFSET` for `page`.
pub(crate) fn write_page(sql: &mut String, binds: &mut Vec<Value>, page: Option<Page>) {
    if let Some(page) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Value::Integer(i64::from(page.limit)));
        binds.push(Value::Integer(i64::from(page.offset)));
    }
}

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn text_values<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<Value> {
    values
        .into_iter()
        .map(|value| Value::Text(value.clone()))
        .collect()
}

/// Text form used for timestamps in storage.
pub(crate) fn datetime_value(value: chrono::NaiveDateTime) -> Value {
    Value::Text(value.format("%F %T%.f").to_string())
}

pub(crate) fn date_value(value: chrono::NaiveDate) -> Value {
    Value::Text(value.format("%F").to_string())
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{placeholders, write_page, Page, SqlFilter};
    use rusqlite::types::Value;

    #[test]
    fn empty_dimensions_add_no_clause() {
        let mut filter = SqlFilter::new();
        filter.any_of("key", Vec::<Value>::new());
        filter.like("description", None);
        filter.compare("created", ">=", None);

        let mut sql = String::from("SELECT 1 FROM t");
        filter.write_where(&mut sql);
        assert_eq!(sql, "SELECT 1 FROM t");
        assert!(filter.into_binds().is_empty());
    }

    #[test]
    fn dimensions_and_together_and_values_or_together() {
        let mut filter = SqlFilter::new();
        filter.any_of("key", vec!["A".to_string(), "B".to_string()]);
        filter.like("description", Some("desc%"));

        let mut sql = String::from("SELECT 1 FROM t");
        filter.write_where(&mut sql);
        assert_eq!(
            sql,
            "SELECT 1 FROM t WHERE key IN (?, ?) AND description LIKE ?"
        );
        assert_eq!(filter.into_binds().len(), 3);
    }

    #[test]
    fn page_binds_limit_then_offset() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        write_page(&mut sql, &mut binds, Some(Page::new(4, 2)));
        assert_eq!(sql, " LIMIT ? OFFSET ?");
        assert_eq!(binds, vec![Value::Integer(2), Value::Integer(4)]);
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
