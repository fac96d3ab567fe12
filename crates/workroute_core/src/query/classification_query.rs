use super::{expect_single, string_list};
use crate::db::Engine;
use crate::error::{CoreError, CoreResult};
use crate::model::classification::Classification;
use crate::repo::{
    ClassificationFilter, ClassificationRepository, Page, SqliteClassificationRepository,
};
use chrono::NaiveDate;
use log::debug;

/// Builder for classification queries.
///
/// ```no_run
/// # use workroute_core::{ClassificationService, Engine, EngineConfig};
/// # let engine = Engine::open_in_memory(EngineConfig::default()).unwrap();
/// let rows = ClassificationService::new(&engine)
///     .create_query()
///     .category(["EXTERN"])
///     .domain(["DOMAIN_A", ""])
///     .list()
///     .unwrap();
/// ```
#[must_use]
pub struct ClassificationQuery<'e> {
    engine: &'e Engine,
    filter: ClassificationFilter,
}

impl<'e> ClassificationQuery<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            filter: ClassificationFilter::default(),
        }
    }

    pub fn key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.keys = string_list(keys);
        self
    }

    pub fn parent_classification_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.parent_keys = string_list(keys);
        self
    }

    pub fn category<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.categories = string_list(categories);
        self
    }

    pub fn classification_type<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.types = string_list(types);
        self
    }

    /// `""` selects root classifications.
    pub fn domain<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.domains = string_list(domains);
        self
    }

    pub fn valid_in_domain(mut self, valid: bool) -> Self {
        self.filter.valid_in_domain = Some(valid);
        self
    }

    /// Matches classifications created on any of the given days.
    pub fn created(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.filter.created = days.into_iter().collect();
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

    /// SQL `LIKE` pattern; `%` and `_` are used as given.
    pub fn description_like(mut self, pattern: impl Into<String>) -> Self {
        self.filter.description_like = Some(pattern.into());
        self
    }

    pub fn priority(mut self, priorities: impl IntoIterator<Item = i32>) -> Self {
        self.filter.priorities = priorities.into_iter().collect();
        self
    }

    pub fn service_level<I, S>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.service_levels = string_list(levels);
        self
    }

    pub fn application_entry_point<I, S>(mut self, entry_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.application_entry_points = string_list(entry_points);
        self
    }

    /// Matches when any of the ten custom fields equals any value.
    pub fn custom_fields<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.custom_fields = string_list(values);
        self
    }

    pub fn valid_from(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.filter.valid_from = days.into_iter().collect();
        self
    }

    pub fn valid_until(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.filter.valid_until = days.into_iter().collect();
        self
    }

    /// Finished criteria, as handed to the repository.
    pub fn build(&self) -> ClassificationFilter {
        self.filter.clone()
    }

    pub fn list(self) -> CoreResult<Vec<Classification>> {
        self.fetch("classification_list", None)
    }

    pub fn list_page(self, offset: u32, limit: u32) -> CoreResult<Vec<Classification>> {
        self.fetch("classification_list_page", Some(Page::new(offset, limit)))
    }

    /// `Ok(None)` on no match; `AmbiguousResult` on more than one.
    pub fn single(self) -> CoreResult<Option<Classification>> {
        let filter = &self.filter;
        self.engine.run("classification_single", |conn| {
            let repo = SqliteClassificationRepository::new(conn);
            let head = repo.query(filter, Some(Page::new(0, 2)))?;
            expect_single(head, || repo.count(filter).map_err(CoreError::from))
        })
    }

    pub fn count(self) -> CoreResult<u64> {
        let filter = &self.filter;
        self.engine.run("classification_count", |conn| {
            SqliteClassificationRepository::new(conn)
                .count(filter)
                .map_err(CoreError::from)
        })
    }

    fn fetch(self, operation: &'static str, page: Option<Page>) -> CoreResult<Vec<Classification>> {
        let filter = &self.filter;
        let rows = self.engine.run(operation, |conn| {
            SqliteClassificationRepository::new(conn)
                .query(filter, page)
                .map_err(CoreError::from)
        })?;
        debug!(
            "event=query_executed module=query status=ok operation={} count={}",
            operation,
            rows.len()
        );
        Ok(rows)
    }
}
