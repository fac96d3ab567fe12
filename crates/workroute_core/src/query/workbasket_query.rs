use super::{expect_single, string_list};
use crate::db::Engine;
use crate::error::{CoreError, CoreResult};
use crate::model::access::PermissionSet;
use crate::model::workbasket::{Workbasket, WorkbasketType};
use crate::repo::{
    Page, PermissionFilter, SqliteWorkbasketRepository, WorkbasketFilter, WorkbasketRepository,
};
use crate::security::{normalize_access_ids, IdentityContext};
use chrono::NaiveDateTime;
use log::debug;

/// Builder for workbasket queries, optionally scoped by permissions.
#[must_use]
pub struct WorkbasketQuery<'e> {
    engine: &'e Engine,
    filter: WorkbasketFilter,
}

impl<'e> WorkbasketQuery<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            filter: WorkbasketFilter::default(),
        }
    }

    pub fn id<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.ids = string_list(ids);
        self
    }

    pub fn key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.keys = string_list(keys);
        self
    }

    pub fn domain<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.domains = string_list(domains);
        self
    }

    pub fn workbasket_type(mut self, types: impl IntoIterator<Item = WorkbasketType>) -> Self {
        self.filter.types = types.into_iter().collect();
        self
    }

    pub fn name<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.names = string_list(names);
        self
    }

    pub fn created_after(mut self, bound: NaiveDateTime) -> Self {
        self.filter.created_after = Some(bound);
        self
    }

    pub fn created_before(mut self, bound: NaiveDateTime) -> Self {
        self.filter.created_before = Some(bound);
        self
    }

    pub fn modified_after(mut self, bound: NaiveDateTime) -> Self {
        self.filter.modified_after = Some(bound);
        self
    }

    pub fn modified_before(mut self, bound: NaiveDateTime) -> Self {
        self.filter.modified_before = Some(bound);
        self
    }

    pub fn description_like(mut self, pattern: impl Into<String>) -> Self {
        self.filter.description_like = Some(pattern.into());
        self
    }

    pub fn owner<I, S>(mut self, owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.owners = string_list(owners);
        self
    }

    /// Restricts results to workbaskets where one access entry of
    /// `access_ids` grants every permission in `permissions`.
    ///
    /// # Errors
    /// `InvalidArgument` when `permissions` is empty or no usable access id
    /// is given.
    pub fn with_permission<I, S>(
        mut self,
        permissions: PermissionSet,
        access_ids: I,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter.permission = Some(self.permission_filter(permissions, access_ids)?);
        Ok(self)
    }

    /// Like [`Self::with_permission`] with the access ids of `identity`.
    pub fn with_caller_permission(
        self,
        permissions: PermissionSet,
        identity: &dyn IdentityContext,
    ) -> CoreResult<Self> {
        let access_ids = identity.access_ids();
        if access_ids.is_empty() {
            return Err(CoreError::invalid_argument(
                "identity context supplied no access ids",
            ));
        }
        self.with_permission(permissions, access_ids)
    }

    pub fn build(&self) -> WorkbasketFilter {
        self.filter.clone()
    }

    pub fn list(self) -> CoreResult<Vec<Workbasket>> {
        self.fetch("workbasket_list", None)
    }

    pub fn list_page(self, offset: u32, limit: u32) -> CoreResult<Vec<Workbasket>> {
        self.fetch("workbasket_list_page", Some(Page::new(offset, limit)))
    }

    pub fn single(self) -> CoreResult<Option<Workbasket>> {
        let filter = &self.filter;
        self.engine.run("workbasket_single", |conn| {
            let repo = SqliteWorkbasketRepository::new(conn);
            let head = repo.query(filter, Some(Page::new(0, 2)))?;
            expect_single(head, || repo.count(filter).map_err(CoreError::from))
        })
    }

    pub fn count(self) -> CoreResult<u64> {
        let filter = &self.filter;
        self.engine.run("workbasket_count", |conn| {
            SqliteWorkbasketRepository::new(conn)
                .count(filter)
                .map_err(CoreError::from)
        })
    }

    fn permission_filter<I, S>(
        &self,
        permissions: PermissionSet,
        access_ids: I,
    ) -> CoreResult<PermissionFilter>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if permissions.is_empty() {
            return Err(CoreError::invalid_argument(
                "permission filter requires at least one permission",
            ));
        }
        let lowercase = self.engine.config().lowercase_access_ids;
        let access_ids = normalize_access_ids(access_ids, lowercase);
        if access_ids.is_empty() {
            return Err(CoreError::invalid_argument(
                "permission filter requires at least one access id",
            ));
        }
        Ok(PermissionFilter {
            permissions,
            access_ids,
            case_insensitive: lowercase,
        })
    }

    fn fetch(self, operation: &'static str, page: Option<Page>) -> CoreResult<Vec<Workbasket>> {
        let filter = &self.filter;
        let rows = self.engine.run(operation, |conn| {
            SqliteWorkbasketRepository::new(conn)
                .query(filter, page)
                .map_err(CoreError::from)
        })?;
        debug!(
            "event=query_executed module=query status=ok operation={} count={} permission_scoped={}",
            operation,
            rows.len(),
            filter.permission.is_some()
        );
        Ok(rows)
    }
}
