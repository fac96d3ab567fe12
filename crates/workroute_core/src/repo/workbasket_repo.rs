//! Workbasket repository: workbaskets, distribution targets and access lists.
//!
//! # Responsibility
//! - Persist workbaskets and their one-hop distribution relation.
//! - Persist access control entries with one column per permission.
//! - Translate [`WorkbasketFilter`] (including the permission filter) into SQL.
//!
//! # Invariants
//! - Distribution targets are stored as directed `(source_id, target_id)`
//!   pairs; no symmetry or transitive closure is implied.
//! - A permission filter matches a workbasket only when one access entry of
//!   the given access ids grants every requested permission.

use super::{
    bool_to_int, datetime_value, int_to_bool, placeholders, text_values, write_page, Page,
    RepoError, RepoResult, SqlFilter,
};
use crate::db::with_savepoint;
use crate::model::access::{AccessControlEntry, PermissionSet};
use crate::model::workbasket::{Workbasket, WorkbasketType, ORG_LEVEL_COUNT};
use crate::security::FOLD_ACCESS_ID_SQL_FN;
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const WORKBASKET_COLUMNS: [&str; 23] = [
    "id",
    "key",
    "created",
    "modified",
    "name",
    "domain",
    "type",
    "description",
    "owner",
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
    "org_level_1",
    "org_level_2",
    "org_level_3",
    "org_level_4",
];

/// Authorization constraint of a workbasket query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionFilter {
    /// Every one of these must be granted by a single entry.
    pub permissions: PermissionSet,
    /// Already normalized for the configured case sensitivity.
    pub access_ids: Vec<String>,
    /// Compare against stored access ids folded with `fold_access_id`.
    pub case_insensitive: bool,
}

/// Criteria for workbasket queries. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkbasketFilter {
    pub ids: Vec<String>,
    pub keys: Vec<String>,
    pub domains: Vec<String>,
    pub types: Vec<WorkbasketType>,
    pub names: Vec<String>,
    pub created_after: Option<NaiveDateTime>,
    pub created_before: Option<NaiveDateTime>,
    pub modified_after: Option<NaiveDateTime>,
    pub modified_before: Option<NaiveDateTime>,
    pub description_like: Option<String>,
    pub owners: Vec<String>,
    pub permission: Option<PermissionFilter>,
}

pub trait WorkbasketRepository {
    fn insert(&self, workbasket: &Workbasket) -> RepoResult<()>;
    fn update(&self, workbasket: &Workbasket) -> RepoResult<()>;
    fn find_by_id(&self, id: &str) -> RepoResult<Option<Workbasket>>;
    fn find_by_key(&self, key: &str) -> RepoResult<Option<Workbasket>>;
    fn query(&self, filter: &WorkbasketFilter, page: Option<Page>) -> RepoResult<Vec<Workbasket>>;
    fn count(&self, filter: &WorkbasketFilter) -> RepoResult<u64>;
    /// Direct targets of `source_id`, ordered by id.
    fn distribution_targets(&self, source_id: &str) -> RepoResult<Vec<Workbasket>>;
    /// Replaces every target of `source_id` in one step.
    fn replace_distribution_targets(&self, source_id: &str, target_ids: &[String])
        -> RepoResult<()>;
    fn upsert_access_entry(&self, entry: &AccessControlEntry) -> RepoResult<()>;
    /// Entries of one workbasket, ordered by access id.
    fn access_entries(&self, workbasket_key: &str) -> RepoResult<Vec<AccessControlEntry>>;
    /// Returns `false` when no such entry existed.
    fn delete_access_entry(&self, workbasket_key: &str, access_id: &str) -> RepoResult<bool>;
    /// Union of the permissions granted to `access_ids` on one workbasket.
    fn effective_permissions(
        &self,
        workbasket_key: &str,
        access_ids: &[String],
        case_insensitive: bool,
    ) -> RepoResult<PermissionSet>;
}

pub struct SqliteWorkbasketRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorkbasketRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn select(&self, tail: &str, binds: Vec<Value>) -> RepoResult<Vec<Workbasket>> {
        let columns = WORKBASKET_COLUMNS
            .iter()
            .map(|column| format!("w.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {columns} FROM workbaskets w{tail};");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut workbaskets = Vec::new();
        while let Some(row) = rows.next()? {
            workbaskets.push(parse_workbasket_row(row)?);
        }
        Ok(workbaskets)
    }
}

impl WorkbasketRepository for SqliteWorkbasketRepository<'_> {
    fn insert(&self, workbasket: &Workbasket) -> RepoResult<()> {
        let sql = format!(
            "INSERT INTO workbaskets ({}) VALUES ({});",
            WORKBASKET_COLUMNS.join(", "),
            placeholders(WORKBASKET_COLUMNS.len())
        );
        self.conn
            .execute(&sql, params_from_iter(row_values(workbasket)?))?;
        Ok(())
    }

    fn update(&self, workbasket: &Workbasket) -> RepoResult<()> {
        let assignments = WORKBASKET_COLUMNS[1..]
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE workbaskets SET {assignments} WHERE id = ?;");
        let mut values = row_values(workbasket)?;
        let id = values.remove(0);
        values.push(id);

        if self.conn.execute(&sql, params_from_iter(values))? == 0 {
            return Err(RepoError::NotFound {
                entity: "workbasket",
                id: workbasket.id.clone(),
            });
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Workbasket>> {
        Ok(self
            .select(" WHERE w.id = ?", vec![Value::Text(id.to_string())])?
            .pop())
    }

    fn find_by_key(&self, key: &str) -> RepoResult<Option<Workbasket>> {
        Ok(self
            .select(" WHERE w.key = ?", vec![Value::Text(key.to_string())])?
            .pop())
    }

    fn query(&self, filter: &WorkbasketFilter, page: Option<Page>) -> RepoResult<Vec<Workbasket>> {
        let predicates = filter_predicates(filter);
        let mut tail = String::new();
        predicates.write_where(&mut tail);
        tail.push_str(" ORDER BY w.id ASC");
        let mut binds = predicates.into_binds();
        write_page(&mut tail, &mut binds, page);
        self.select(&tail, binds)
    }

    fn count(&self, filter: &WorkbasketFilter) -> RepoResult<u64> {
        let predicates = filter_predicates(filter);
        let mut sql = String::from("SELECT COUNT(*) FROM workbaskets w");
        predicates.write_where(&mut sql);
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(predicates.into_binds()),
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn distribution_targets(&self, source_id: &str) -> RepoResult<Vec<Workbasket>> {
        self.select(
            " JOIN distribution_targets d ON d.target_id = w.id
              WHERE d.source_id = ?
              ORDER BY w.id ASC",
            vec![Value::Text(source_id.to_string())],
        )
    }

    fn replace_distribution_targets(
        &self,
        source_id: &str,
        target_ids: &[String],
    ) -> RepoResult<()> {
        with_savepoint(self.conn, "replace_distribution_targets", |conn| {
            conn.execute(
                "DELETE FROM distribution_targets WHERE source_id = ?1;",
                [source_id],
            )?;
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO distribution_targets (source_id, target_id)
                 VALUES (?1, ?2);",
            )?;
            for target_id in target_ids {
                stmt.execute(params![source_id, target_id])?;
            }
            Ok(())
        })
    }

    fn upsert_access_entry(&self, entry: &AccessControlEntry) -> RepoResult<()> {
        let columns = PermissionSet::columns()
            .map(|(_, column)| column)
            .collect::<Vec<_>>();
        let updates = columns
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO workbasket_access_list (workbasket_key, access_id, {})
             VALUES ({})
             ON CONFLICT (workbasket_key, access_id) DO UPDATE SET {updates};",
            columns.join(", "),
            placeholders(columns.len() + 2)
        );

        let mut values = vec![
            Value::Text(entry.workbasket_key.clone()),
            Value::Text(entry.access_id.clone()),
        ];
        values.extend(
            PermissionSet::columns()
                .map(|(flag, _)| Value::Integer(bool_to_int(entry.permissions.contains(flag)))),
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn access_entries(&self, workbasket_key: &str) -> RepoResult<Vec<AccessControlEntry>> {
        let columns = PermissionSet::columns()
            .map(|(_, column)| column)
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT workbasket_key, access_id, {columns}
             FROM workbasket_access_list
             WHERE workbasket_key = ?1
             ORDER BY access_id ASC;"
        ))?;
        let mut rows = stmt.query([workbasket_key])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(AccessControlEntry {
                workbasket_key: row.get("workbasket_key")?,
                access_id: row.get("access_id")?,
                permissions: parse_permissions(row)?,
            });
        }
        Ok(entries)
    }

    fn delete_access_entry(&self, workbasket_key: &str, access_id: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM workbasket_access_list WHERE workbasket_key = ?1 AND access_id = ?2;",
            [workbasket_key, access_id],
        )?;
        Ok(changed > 0)
    }

    fn effective_permissions(
        &self,
        workbasket_key: &str,
        access_ids: &[String],
        case_insensitive: bool,
    ) -> RepoResult<PermissionSet> {
        if access_ids.is_empty() {
            return Ok(PermissionSet::empty());
        }
        let columns = PermissionSet::columns()
            .map(|(_, column)| column)
            .collect::<Vec<_>>()
            .join(", ");
        let access_column = if case_insensitive {
            format!("{FOLD_ACCESS_ID_SQL_FN}(access_id)")
        } else {
            "access_id".to_string()
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {columns}
             FROM workbasket_access_list
             WHERE workbasket_key = ? AND {access_column} IN ({});",
            placeholders(access_ids.len())
        ))?;

        let mut binds = vec![Value::Text(workbasket_key.to_string())];
        binds.extend(text_values(access_ids));
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut granted = PermissionSet::empty();
        while let Some(row) = rows.next()? {
            granted |= parse_permissions(row)?;
        }
        Ok(granted)
    }
}

fn filter_predicates(filter: &WorkbasketFilter) -> SqlFilter {
    let mut predicates = SqlFilter::new();
    predicates.any_of("w.id", text_values(&filter.ids));
    predicates.any_of("w.key", text_values(&filter.keys));
    predicates.any_of("w.domain", text_values(&filter.domains));
    predicates.any_of(
        "w.type",
        filter
            .types
            .iter()
            .map(|kind| Value::Text(kind.as_str().to_string())),
    );
    predicates.any_of("w.name", text_values(&filter.names));
    predicates.compare("w.created", ">=", filter.created_after.map(datetime_value));
    predicates.compare("w.created", "<=", filter.created_before.map(datetime_value));
    predicates.compare("w.modified", ">=", filter.modified_after.map(datetime_value));
    predicates.compare("w.modified", "<=", filter.modified_before.map(datetime_value));
    predicates.like("w.description", filter.description_like.as_deref());
    predicates.any_of("w.owner", text_values(&filter.owners));

    if let Some(permission) = &filter.permission {
        let access_column = if permission.case_insensitive {
            format!("{FOLD_ACCESS_ID_SQL_FN}(acl.access_id)")
        } else {
            "acl.access_id".to_string()
        };
        let mut clause = format!(
            "EXISTS (SELECT 1 FROM workbasket_access_list acl
                     WHERE acl.workbasket_key = w.key
                       AND {access_column} IN ({})",
            placeholders(permission.access_ids.len())
        );
        for column in permission.permissions.column_names() {
            clause.push_str(&format!(" AND acl.{column} = 1"));
        }
        clause.push(')');
        predicates.raw(clause, text_values(&permission.access_ids));
    }
    predicates
}

fn row_values(workbasket: &Workbasket) -> RepoResult<Vec<Value>> {
    let created = workbasket.created.ok_or_else(|| {
        RepoError::InvalidData(format!(
            "workbasket `{}` has no created timestamp",
            workbasket.key
        ))
    })?;
    let modified = workbasket.modified.unwrap_or(created);

    let mut values = vec![
        Value::Text(workbasket.id.clone()),
        Value::Text(workbasket.key.clone()),
        datetime_value(created),
        datetime_value(modified),
        Value::Text(workbasket.name.clone()),
        Value::Text(workbasket.domain.clone()),
        Value::Text(workbasket.kind.as_str().to_string()),
        Value::from(workbasket.description.clone()),
        Value::from(workbasket.owner.clone()),
    ];
    values.extend(workbasket.custom.iter().cloned().map(Value::from));
    values.extend(workbasket.org_levels.iter().cloned().map(Value::from));
    Ok(values)
}

fn parse_workbasket_row(row: &Row<'_>) -> RepoResult<Workbasket> {
    let type_text: String = row.get("type")?;
    let kind = WorkbasketType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid workbasket type `{type_text}` in workbaskets.type"
        ))
    })?;

    let mut custom: crate::model::CustomFields = Default::default();
    for (index, slot) in custom.iter_mut().enumerate() {
        *slot = row.get(format!("custom_{}", index + 1).as_str())?;
    }
    let mut org_levels: [Option<String>; ORG_LEVEL_COUNT] = Default::default();
    for (index, slot) in org_levels.iter_mut().enumerate() {
        *slot = row.get(format!("org_level_{}", index + 1).as_str())?;
    }

    Ok(Workbasket {
        id: row.get("id")?,
        key: row.get("key")?,
        created: Some(row.get("created")?),
        modified: Some(row.get("modified")?),
        name: row.get("name")?,
        domain: row.get("domain")?,
        kind,
        description: row.get("description")?,
        owner: row.get("owner")?,
        custom,
        org_levels,
    })
}

fn parse_permissions(row: &Row<'_>) -> RepoResult<PermissionSet> {
    let mut permissions = PermissionSet::empty();
    for (flag, column) in PermissionSet::columns() {
        if int_to_bool(row.get(column)?, column)? {
            permissions |= flag;
        }
    }
    Ok(permissions)
}
