//! Workbasket use-case service.
//!
//! # Responsibility
//! - Create, update and load workbaskets with READ authorization.
//! - Manage access control entries and one-hop distribution targets.
//! - Find workbaskets by permission for one access id.
//!
//! # Invariants
//! - Lookups distinguish `WorkbasketNotFound` from `NotAuthorized`.
//! - Distribution targets are replaced as a whole and must all exist.

use crate::config::EngineConfig;
use crate::db::Engine;
use crate::error::{CoreError, CoreResult};
use crate::model::access::{AccessControlEntry, PermissionSet};
use crate::model::generate_id;
use crate::model::workbasket::{Workbasket, WORKBASKET_ID_PREFIX};
use crate::query::WorkbasketQuery;
use crate::repo::{RepoError, SqliteWorkbasketRepository, WorkbasketRepository};
use crate::security::{normalize_access_ids, IdentityContext};
use log::{debug, info, warn};
use rusqlite::Connection;

/// Fails with `NotAuthorized` unless `identity` holds every permission in
/// `required` on the workbasket with `workbasket_key`.
pub(crate) fn authorize(
    conn: &Connection,
    config: &EngineConfig,
    workbasket_key: &str,
    required: PermissionSet,
    identity: &dyn IdentityContext,
) -> CoreResult<()> {
    let access_ids = normalize_access_ids(identity.access_ids(), config.lowercase_access_ids);
    let granted = SqliteWorkbasketRepository::new(conn).effective_permissions(
        workbasket_key,
        &access_ids,
        config.lowercase_access_ids,
    )?;
    if granted.contains(required) {
        return Ok(());
    }
    warn!(
        "event=authorization_denied module=workbasket status=error workbasket_key={} required={:?}",
        workbasket_key, required
    );
    Err(CoreError::NotAuthorized {
        access_ids,
        workbasket_key: workbasket_key.to_string(),
        permission: format!("{required:?}"),
    })
}

pub struct WorkbasketService<'e> {
    engine: &'e Engine,
}

impl<'e> WorkbasketService<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// # Errors
    /// - `InvalidArgument` for a blank key or name.
    /// - `WorkbasketAlreadyExists` when the key is taken.
    pub fn create(&self, mut workbasket: Workbasket) -> CoreResult<Workbasket> {
        validate(&workbasket)?;
        let now = self.engine.now();
        workbasket.id = generate_id(WORKBASKET_ID_PREFIX);
        workbasket.created = Some(now);
        workbasket.modified = Some(now);

        self.engine.run("workbasket_create", |conn| {
            let repo = SqliteWorkbasketRepository::new(conn);
            if repo.find_by_key(&workbasket.key)?.is_some() {
                return Err(CoreError::WorkbasketAlreadyExists(workbasket.key.clone()));
            }
            repo.insert(&workbasket)
                .map_err(|err| map_duplicate(err, &workbasket.key))
        })?;

        info!(
            "event=workbasket_created module=workbasket status=ok id={} key={}",
            workbasket.id, workbasket.key
        );
        Ok(workbasket)
    }

    pub fn update(&self, mut workbasket: Workbasket) -> CoreResult<Workbasket> {
        validate(&workbasket)?;
        let now = self.engine.now();
        self.engine.run("workbasket_update", |conn| {
            let repo = SqliteWorkbasketRepository::new(conn);
            let existing = repo
                .find_by_id(&workbasket.id)?
                .ok_or_else(|| CoreError::WorkbasketNotFound(workbasket.id.clone()))?;
            if let Some(other) = repo.find_by_key(&workbasket.key)? {
                if other.id != existing.id {
                    return Err(CoreError::WorkbasketAlreadyExists(workbasket.key.clone()));
                }
            }
            workbasket.created = existing.created;
            workbasket.modified = Some(now);
            repo.update(&workbasket)
                .map_err(|err| map_duplicate(err, &workbasket.key))
        })?;
        Ok(workbasket)
    }

    /// Loads a workbasket the caller may READ.
    pub fn get(&self, id: &str, identity: &dyn IdentityContext) -> CoreResult<Workbasket> {
        let config = self.engine.config();
        self.engine.run("workbasket_get", |conn| {
            let workbasket = SqliteWorkbasketRepository::new(conn)
                .find_by_id(id)?
                .ok_or_else(|| CoreError::WorkbasketNotFound(id.to_string()))?;
            authorize(conn, config, &workbasket.key, PermissionSet::READ, identity)?;
            Ok(workbasket)
        })
    }

    pub fn get_by_key(&self, key: &str, identity: &dyn IdentityContext) -> CoreResult<Workbasket> {
        let config = self.engine.config();
        self.engine.run("workbasket_get_by_key", |conn| {
            let workbasket = SqliteWorkbasketRepository::new(conn)
                .find_by_key(key)?
                .ok_or_else(|| CoreError::WorkbasketNotFound(key.to_string()))?;
            authorize(conn, config, &workbasket.key, PermissionSet::READ, identity)?;
            Ok(workbasket)
        })
    }

    /// Fails with `NotAuthorized` unless `identity` holds all of `required`.
    pub fn check_authorization(
        &self,
        workbasket_key: &str,
        required: PermissionSet,
        identity: &dyn IdentityContext,
    ) -> CoreResult<()> {
        let config = self.engine.config();
        self.engine.run("workbasket_authorize", |conn| {
            authorize(conn, config, workbasket_key, required, identity)
        })
    }

    /// Inserts or replaces the entry for `(workbasket_key, access_id)`.
    pub fn set_access_entry(&self, entry: &AccessControlEntry) -> CoreResult<()> {
        if entry.access_id.trim().is_empty() {
            return Err(CoreError::invalid_argument("access id must not be blank"));
        }
        self.engine.run("workbasket_set_access", |conn| {
            let repo = SqliteWorkbasketRepository::new(conn);
            if repo.find_by_key(&entry.workbasket_key)?.is_none() {
                return Err(CoreError::WorkbasketNotFound(entry.workbasket_key.clone()));
            }
            repo.upsert_access_entry(entry).map_err(CoreError::from)
        })?;
        debug!(
            "event=access_entry_set module=workbasket status=ok workbasket_key={} access_id={} permissions={:?}",
            entry.workbasket_key, entry.access_id, entry.permissions
        );
        Ok(())
    }

    pub fn access_entries(&self, workbasket_key: &str) -> CoreResult<Vec<AccessControlEntry>> {
        self.engine.run("workbasket_access_entries", |conn| {
            SqliteWorkbasketRepository::new(conn)
                .access_entries(workbasket_key)
                .map_err(CoreError::from)
        })
    }

    /// Returns `false` when no such entry existed.
    pub fn delete_access_entry(&self, workbasket_key: &str, access_id: &str) -> CoreResult<bool> {
        self.engine.run("workbasket_delete_access", |conn| {
            SqliteWorkbasketRepository::new(conn)
                .delete_access_entry(workbasket_key, access_id)
                .map_err(CoreError::from)
        })
    }

    /// Direct distribution targets, ordered by id.
    ///
    /// # Errors
    /// `WorkbasketNotFound` when `workbasket_id` is unknown.
    pub fn get_distribution_targets(&self, workbasket_id: &str) -> CoreResult<Vec<Workbasket>> {
        self.engine.run("workbasket_distribution_targets", |conn| {
            let repo = SqliteWorkbasketRepository::new(conn);
            if repo.find_by_id(workbasket_id)?.is_none() {
                return Err(CoreError::WorkbasketNotFound(workbasket_id.to_string()));
            }
            repo.distribution_targets(workbasket_id)
                .map_err(CoreError::from)
        })
    }

    /// Replaces the distribution targets of `source_id`.
    ///
    /// # Errors
    /// `WorkbasketNotFound` for an unknown source or target id; nothing is
    /// changed in that case.
    pub fn set_distribution_targets(
        &self,
        source_id: &str,
        target_ids: &[String],
    ) -> CoreResult<()> {
        self.engine.run("workbasket_set_distribution_targets", |conn| {
            let repo = SqliteWorkbasketRepository::new(conn);
            for id in std::iter::once(source_id).chain(target_ids.iter().map(String::as_str)) {
                if repo.find_by_id(id)?.is_none() {
                    return Err(CoreError::WorkbasketNotFound(id.to_string()));
                }
            }
            repo.replace_distribution_targets(source_id, target_ids)
                .map_err(CoreError::from)
        })?;
        debug!(
            "event=distribution_targets_set module=workbasket status=ok source_id={} targets={}",
            source_id,
            target_ids.len()
        );
        Ok(())
    }

    /// Workbaskets on which one entry of `access_id` grants all `permissions`,
    /// ordered by id.
    pub fn find_by_permission(
        &self,
        permissions: PermissionSet,
        access_id: &str,
    ) -> CoreResult<Vec<Workbasket>> {
        self.create_query()
            .with_permission(permissions, [access_id])?
            .list()
    }

    pub fn create_query(&self) -> WorkbasketQuery<'e> {
        WorkbasketQuery::new(self.engine)
    }
}

fn validate(workbasket: &Workbasket) -> CoreResult<()> {
    if workbasket.key.trim().is_empty() {
        return Err(CoreError::invalid_argument("workbasket key must not be blank"));
    }
    if workbasket.name.trim().is_empty() {
        return Err(CoreError::invalid_argument("workbasket name must not be blank"));
    }
    Ok(())
}

fn map_duplicate(err: RepoError, key: &str) -> CoreError {
    match err {
        RepoError::Duplicate(_) => CoreError::WorkbasketAlreadyExists(key.to_string()),
        other => CoreError::from(other),
    }
}
