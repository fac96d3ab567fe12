//! Classification repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and load classifications.
//! - Translate [`ClassificationFilter`] dimensions into SQL predicates,
//!   including the fan-out over the ten custom columns.
//!
//! # Invariants
//! - Write paths call `Classification::validate()` before SQL mutations.
//! - Filtered listings are ordered by id ascending.

use super::{
    bool_to_int, date_value, datetime_value, int_to_bool, text_values, write_page, Page,
    RepoError, RepoResult, SqlFilter,
};
use crate::model::classification::{Classification, ClassificationValidationError};
use crate::model::CUSTOM_FIELD_COUNT;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

const CLASSIFICATION_COLUMNS: [&str; 26] = [
    "id",
    "key",
    "parent_classification_key",
    "category",
    "type",
    "domain",
    "valid_in_domain",
    "created",
    "modified",
    "name",
    "description",
    "priority",
    "service_level",
    "application_entry_point",
    "custom_1",
    "custom_2",
    "custom_3",
    "custom_4",
    "custom_5",
    "custom_6",
    "custom_7",
    "custom_8",
    "custom_9",
    "custom_10",
    "valid_from",
    "valid_until",
];

/// Criteria for classification queries.
///
/// Every empty dimension leaves the result unconstrained. Values inside one
/// dimension are alternatives; dimensions must all hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationFilter {
    pub keys: Vec<String>,
    pub parent_keys: Vec<String>,
    pub categories: Vec<String>,
    pub types: Vec<String>,
    pub domains: Vec<String>,
    pub valid_in_domain: Option<bool>,
    /// Calendar days the `created` timestamp must fall on.
    pub created: Vec<NaiveDate>,
    pub names: Vec<String>,
    /// SQL `LIKE` pattern, wildcards included by the caller.
    pub description_like: Option<String>,
    pub priorities: Vec<i32>,
    pub service_levels: Vec<String>,
    pub application_entry_points: Vec<String>,
    /// Matches when any custom column equals any value.
    pub custom_fields: Vec<String>,
    pub valid_from: Vec<NaiveDate>,
    pub valid_until: Vec<NaiveDate>,
}

pub trait ClassificationRepository {
    fn insert(&self, classification: &Classification) -> RepoResult<()>;
    /// Rewrites every column of the row with `classification.id`.
    fn update(&self, classification: &Classification) -> RepoResult<()>;
    fn find_by_id(&self, id: &str) -> RepoResult<Option<Classification>>;
    fn find_by_key_and_domain(&self, key: &str, domain: &str)
        -> RepoResult<Option<Classification>>;
    /// Every domain variant of `key`, ordered by domain then id.
    fn list_by_key(&self, key: &str) -> RepoResult<Vec<Classification>>;
    /// Every classification, ordered by domain, key, id.
    fn list_all(&self) -> RepoResult<Vec<Classification>>;
    fn query(
        &self,
        filter: &ClassificationFilter,
        page: Option<Page>,
    ) -> RepoResult<Vec<Classification>>;
    fn count(&self, filter: &ClassificationFilter) -> RepoResult<u64>;
}

pub struct SqliteClassificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteClassificationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn select_where(
        &self,
        clause: &str,
        binds: Vec<Value>,
        order: &str,
    ) -> RepoResult<Vec<Classification>> {
        let sql = format!(
            "SELECT {} FROM classifications{clause} ORDER BY {order};",
            CLASSIFICATION_COLUMNS.join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut classifications = Vec::new();
        while let Some(row) = rows.next()? {
            classifications.push(parse_classification_row(row)?);
        }
        Ok(classifications)
    }
}

impl ClassificationRepository for SqliteClassificationRepository<'_> {
    fn insert(&self, classification: &Classification) -> RepoResult<()> {
        classification.validate().map_err(invalid_input)?;
        let sql = format!(
            "INSERT INTO classifications ({}) VALUES ({});",
            CLASSIFICATION_COLUMNS.join(", "),
            super::placeholders(CLASSIFICATION_COLUMNS.len())
        );
        self.conn
            .execute(&sql, params_from_iter(row_values(classification)?))?;
        Ok(())
    }

    fn update(&self, classification: &Classification) -> RepoResult<()> {
        classification.validate().map_err(invalid_input)?;
        let assignments = CLASSIFICATION_COLUMNS[1..]
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE classifications SET {assignments} WHERE id = ?;");

        let mut values = row_values(classification)?;
        let id = values.remove(0);
        values.push(id);

        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "classification",
                id: classification.id.clone(),
            });
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Classification>> {
        let mut found = self.select_where(
            " WHERE id = ?",
            vec![Value::Text(id.to_string())],
            "id ASC",
        )?;
        Ok(found.pop())
    }

    fn find_by_key_and_domain(
        &self,
        key: &str,
        domain: &str,
    ) -> RepoResult<Option<Classification>> {
        let sql = format!(
            "SELECT {} FROM classifications WHERE key = ?1 AND domain = ?2;",
            CLASSIFICATION_COLUMNS.join(", ")
        );
        self.conn
            .query_row(&sql, [key, domain], |row| Ok(parse_classification_row(row)))
            .optional()?
            .transpose()
    }

    fn list_by_key(&self, key: &str) -> RepoResult<Vec<Classification>> {
        self.select_where(
            " WHERE key = ?",
            vec![Value::Text(key.to_string())],
            "domain ASC, id ASC",
        )
    }

    fn list_all(&self) -> RepoResult<Vec<Classification>> {
        self.select_where("", Vec::new(), "domain ASC, key ASC, id ASC")
    }

    fn query(
        &self,
        filter: &ClassificationFilter,
        page: Option<Page>,
    ) -> RepoResult<Vec<Classification>> {
        let predicates = filter_predicates(filter);
        let mut clause = String::new();
        predicates.write_where(&mut clause);
        let mut binds = predicates.into_binds();
        let mut order = String::from("id ASC");
        write_page(&mut order, &mut binds, page);
        self.select_where(&clause, binds, &order)
    }

    fn count(&self, filter: &ClassificationFilter) -> RepoResult<u64> {
        let predicates = filter_predicates(filter);
        let mut sql = String::from("SELECT COUNT(*) FROM classifications");
        predicates.write_where(&mut sql);
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(predicates.into_binds()),
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }
}

fn filter_predicates(filter: &ClassificationFilter) -> SqlFilter {
    let mut predicates = SqlFilter::new();
    predicates.any_of("key", text_values(&filter.keys));
    predicates.any_of("parent_classification_key", text_values(&filter.parent_keys));
    predicates.any_of("category", text_values(&filter.categories));
    predicates.any_of("type", text_values(&filter.types));
    predicates.any_of("domain", text_values(&filter.domains));
    predicates.compare(
        "valid_in_domain",
        "=",
        filter
            .valid_in_domain
            .map(|value| Value::Integer(bool_to_int(value))),
    );
    predicates.any_of(
        "date(created)",
        filter.created.iter().copied().map(date_value),
    );
    predicates.any_of("name", text_values(&filter.names));
    predicates.like("description", filter.description_like.as_deref());
    predicates.any_of(
        "priority",
        filter.priorities.iter().map(|value| Value::Integer(i64::from(*value))),
    );
    predicates.any_of("service_level", text_values(&filter.service_levels));
    predicates.any_of(
        "application_entry_point",
        text_values(&filter.application_entry_points),
    );
    if !filter.custom_fields.is_empty() {
        let list = super::placeholders(filter.custom_fields.len());
        let clause = (1..=CUSTOM_FIELD_COUNT)
            .map(|number| format!("custom_{number} IN ({list})"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let binds = (0..CUSTOM_FIELD_COUNT)
            .flat_map(|_| text_values(&filter.custom_fields))
            .collect::<Vec<_>>();
        predicates.raw(format!("({clause})"), binds);
    }
    predicates.any_of("valid_from", filter.valid_from.iter().copied().map(date_value));
    predicates.any_of(
        "valid_until",
        filter.valid_until.iter().copied().map(date_value),
    );
    predicates
}

fn row_values(classification: &Classification) -> RepoResult<Vec<Value>> {
    let created = classification.created.ok_or_else(|| {
        RepoError::InvalidData(format!(
            "classification `{}` has no created timestamp",
            classification.key
        ))
    })?;
    let valid_from = classification.valid_from.unwrap_or_else(|| created.date());
    let modified = classification.modified.unwrap_or(created);

    let mut values = vec![
        Value::Text(classification.id.clone()),
        Value::Text(classification.key.clone()),
        Value::Text(classification.parent_classification_key.clone()),
        Value::from(classification.category.clone()),
        Value::from(classification.kind.clone()),
        Value::Text(classification.domain.clone()),
        Value::Integer(bool_to_int(classification.is_valid_in_domain)),
        datetime_value(created),
        datetime_value(modified),
        Value::from(classification.name.clone()),
        Value::from(classification.description.clone()),
        Value::Integer(i64::from(classification.priority)),
        Value::from(classification.service_level.clone()),
        Value::from(classification.application_entry_point.clone()),
    ];
    values.extend(classification.custom.iter().cloned().map(Value::from));
    values.push(date_value(valid_from));
    values.push(date_value(classification.valid_until));
    Ok(values)
}

fn parse_classification_row(row: &Row<'_>) -> RepoResult<Classification> {
    let mut custom: crate::model::CustomFields = Default::default();
    for (index, slot) in custom.iter_mut().enumerate() {
        *slot = row.get(format!("custom_{}", index + 1).as_str())?;
    }

    Ok(Classification {
        id: row.get("id")?,
        key: row.get("key")?,
        parent_classification_key: row.get("parent_classification_key")?,
        category: row.get("category")?,
        kind: row.get("type")?,
        domain: row.get("domain")?,
        is_valid_in_domain: int_to_bool(
            row.get("valid_in_domain")?,
            "classifications.valid_in_domain",
        )?,
        created: Some(row.get("created")?),
        modified: Some(row.get("modified")?),
        name: row.get("name")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        service_level: row.get("service_level")?,
        application_entry_point: row.get("application_entry_point")?,
        custom,
        valid_from: Some(row.get("valid_from")?),
        valid_until: row.get("valid_until")?,
    })
}

fn invalid_input(err: ClassificationValidationError) -> RepoError {
    RepoError::InvalidData(err.to_string())
}
