//! Classification use-case service.
//!
//! # Responsibility
//! - Resolve `(key, domain)` pairs with fallback to the root domain.
//! - Create and update classifications, keeping a root row per key.
//! - Re-assemble classifications into a per-domain forest.
//!
//! # Invariants
//! - No two persisted classifications share `(key, domain)`.
//! - Creating a domain-specific classification guarantees a root row for its key.
//! - `get_tree` returns every classification exactly once.

use crate::db::Engine;
use crate::error::{CoreError, CoreResult};
use crate::model::classification::{
    Classification, ClassificationNode, CLASSIFICATION_ID_PREFIX, ROOT_DOMAIN,
};
use crate::model::generate_id;
use crate::query::ClassificationQuery;
use crate::repo::{ClassificationRepository, RepoError, SqliteClassificationRepository};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

/// Resolves `key` in `domain`, falling back to the root domain.
///
/// # Errors
/// `ClassificationNotFound` when neither the exact row nor the root row exists.
pub fn resolve_with<R: ClassificationRepository>(
    repo: &R,
    key: &str,
    domain: &str,
) -> CoreResult<Classification> {
    if let Some(found) = repo.find_by_key_and_domain(key, domain)? {
        return Ok(found);
    }
    if domain != ROOT_DOMAIN {
        if let Some(root) = repo.find_by_key_and_domain(key, ROOT_DOMAIN)? {
            debug!(
                "event=classification_resolved module=classification status=ok key={} domain={} fallback=root",
                key, domain
            );
            return Ok(root);
        }
    }
    Err(CoreError::ClassificationNotFound {
        key: key.to_string(),
        domain: domain.to_string(),
    })
}

/// Groups classifications into trees by parent key within each domain.
///
/// Rows whose parent key has no match in their domain, and rows caught in a
/// parent cycle, are placed at the root level.
pub fn assemble_forest(classifications: Vec<Classification>) -> Vec<ClassificationNode> {
    let mut by_domain_key: HashMap<(&str, &str), usize> = HashMap::new();
    for (index, classification) in classifications.iter().enumerate() {
        by_domain_key.insert(
            (classification.domain.as_str(), classification.key.as_str()),
            index,
        );
    }

    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut roots = Vec::new();
    for (index, classification) in classifications.iter().enumerate() {
        let parent = (!classification.parent_classification_key.is_empty())
            .then(|| {
                by_domain_key.get(&(
                    classification.domain.as_str(),
                    classification.parent_classification_key.as_str(),
                ))
            })
            .flatten();
        match parent {
            Some(parent) => children.entry(*parent).or_default().push(index),
            None => roots.push(index),
        }
    }

    let mut visited = vec![false; classifications.len()];
    let mut forest = Vec::new();
    for root in roots {
        forest.push(build_node(root, &classifications, &children, &mut visited));
    }
    for index in 0..classifications.len() {
        if !visited[index] {
            forest.push(build_node(index, &classifications, &children, &mut visited));
        }
    }
    forest
}

fn build_node(
    index: usize,
    classifications: &[Classification],
    children: &BTreeMap<usize, Vec<usize>>,
    visited: &mut [bool],
) -> ClassificationNode {
    visited[index] = true;
    let mut node = ClassificationNode {
        classification: classifications[index].clone(),
        children: Vec::new(),
    };
    for child in children.get(&index).into_iter().flatten() {
        if !visited[*child] {
            node.children
                .push(build_node(*child, classifications, children, visited));
        }
    }
    node
}

pub struct ClassificationService<'e> {
    engine: &'e Engine,
}

impl<'e> ClassificationService<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// See [`resolve_with`].
    pub fn resolve(&self, key: &str, domain: &str) -> CoreResult<Classification> {
        self.engine.run("classification_resolve", |conn| {
            resolve_with(&SqliteClassificationRepository::new(conn), key, domain)
        })
    }

    pub fn get_by_id(&self, id: &str) -> CoreResult<Option<Classification>> {
        self.engine.run("classification_get", |conn| {
            SqliteClassificationRepository::new(conn)
                .find_by_id(id)
                .map_err(CoreError::from)
        })
    }

    /// Creates `classification` and, for a domain-specific key without a root
    /// row, the root copy as well.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank key or an invalid service level.
    /// - `ClassificationAlreadyExists` when `(key, domain)` is taken.
    pub fn create(&self, mut classification: Classification) -> CoreResult<Classification> {
        classification
            .validate()
            .map_err(|err| CoreError::invalid_argument(err.to_string()))?;

        let now = self.engine.now();
        classification.id = generate_id(CLASSIFICATION_ID_PREFIX);
        classification.created = Some(now);
        classification.modified = Some(now);
        if classification.valid_from.is_none() {
            classification.valid_from = Some(now.date());
        }

        self.engine.run("classification_create", |conn| {
            let repo = SqliteClassificationRepository::new(conn);
            if repo
                .find_by_key_and_domain(&classification.key, &classification.domain)?
                .is_some()
            {
                return Err(already_exists(&classification));
            }
            repo.insert(&classification)
                .map_err(|err| map_duplicate(err, &classification))?;

            if !classification.is_root()
                && repo
                    .find_by_key_and_domain(&classification.key, ROOT_DOMAIN)?
                    .is_none()
            {
                let mut root = classification.root_copy();
                root.id = generate_id(CLASSIFICATION_ID_PREFIX);
                root.created = Some(now);
                root.modified = Some(now);
                repo.insert(&root).map_err(|err| map_duplicate(err, &root))?;
                info!(
                    "event=classification_created module=classification status=ok id={} key={} domain=root",
                    root.id, root.key
                );
            }
            Ok(())
        })?;

        info!(
            "event=classification_created module=classification status=ok id={} key={} domain={}",
            classification.id, classification.key, classification.domain
        );
        Ok(classification)
    }

    /// Rewrites the classification with `classification.id` in place.
    ///
    /// `modified` becomes now and `valid_from` becomes today on every update.
    pub fn update(&self, mut classification: Classification) -> CoreResult<Classification> {
        let now = self.engine.now();
        classification.valid_from = Some(now.date());
        classification
            .validate()
            .map_err(|err| CoreError::invalid_argument(err.to_string()))?;

        self.engine.run("classification_update", |conn| {
            let repo = SqliteClassificationRepository::new(conn);
            let existing = repo.find_by_id(&classification.id)?.ok_or_else(|| {
                CoreError::ClassificationNotFound {
                    key: classification.key.clone(),
                    domain: classification.domain.clone(),
                }
            })?;
            if let Some(other) =
                repo.find_by_key_and_domain(&classification.key, &classification.domain)?
            {
                if other.id != existing.id {
                    return Err(already_exists(&classification));
                }
            }

            classification.created = existing.created;
            classification.modified = Some(now);
            repo.update(&classification)
                .map_err(|err| map_duplicate(err, &classification))
        })?;

        debug!(
            "event=classification_updated module=classification status=ok id={}",
            classification.id
        );
        Ok(classification)
    }

    /// Every domain variant of `key`, ordered by domain then id.
    pub fn list_all_with_key(&self, key: &str) -> CoreResult<Vec<Classification>> {
        self.engine.run("classification_list_with_key", |conn| {
            SqliteClassificationRepository::new(conn)
                .list_by_key(key)
                .map_err(CoreError::from)
        })
    }

    pub fn get_tree(&self) -> CoreResult<Vec<ClassificationNode>> {
        let all = self.engine.run("classification_tree", |conn| {
            SqliteClassificationRepository::new(conn)
                .list_all()
                .map_err(CoreError::from)
        })?;
        Ok(assemble_forest(all))
    }

    pub fn create_query(&self) -> ClassificationQuery<'e> {
        ClassificationQuery::new(self.engine)
    }
}

fn already_exists(classification: &Classification) -> CoreError {
    CoreError::ClassificationAlreadyExists {
        key: classification.key.clone(),
        domain: classification.domain.clone(),
    }
}

fn map_duplicate(err: RepoError, classification: &Classification) -> CoreError {
    match err {
        RepoError::Duplicate(_) => already_exists(classification),
        other => CoreError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::{assemble_forest, resolve_with};
    use crate::error::CoreError;
    use crate::model::classification::Classification;
    use crate::repo::{ClassificationFilter, ClassificationRepository, Page, RepoResult};

    struct FakeRepo {
        rows: Vec<Classification>,
    }

    impl ClassificationRepository for FakeRepo {
        fn insert(&self, _: &Classification) -> RepoResult<()> {
            Ok(())
        }
        fn update(&self, _: &Classification) -> RepoResult<()> {
            Ok(())
        }
        fn find_by_id(&self, id: &str) -> RepoResult<Option<Classification>> {
            Ok(self.rows.iter().find(|row| row.id == id).cloned())
        }
        fn find_by_key_and_domain(
            &self,
            key: &str,
            domain: &str,
        ) -> RepoResult<Option<Classification>> {
            Ok(self
                .rows
                .iter()
                .find(|row| row.key == key && row.domain == domain)
                .cloned())
        }
        fn list_by_key(&self, key: &str) -> RepoResult<Vec<Classification>> {
            Ok(self.rows.iter().filter(|row| row.key == key).cloned().collect())
        }
        fn list_all(&self) -> RepoResult<Vec<Classification>> {
            Ok(self.rows.clone())
        }
        fn query(
            &self,
            _: &ClassificationFilter,
            _: Option<Page>,
        ) -> RepoResult<Vec<Classification>> {
            Ok(self.rows.clone())
        }
        fn count(&self, _: &ClassificationFilter) -> RepoResult<u64> {
            Ok(self.rows.len() as u64)
        }
    }

    fn row(id: &str, key: &str, domain: &str, parent: &str) -> Classification {
        let mut classification = Classification::new(key, domain);
        classification.id = id.to_string();
        classification.parent_classification_key = parent.to_string();
        classification
    }

    #[test]
    fn resolve_prefers_exact_domain_then_root() {
        let repo = FakeRepo {
            rows: vec![row("CLI:root", "K", "", ""), row("CLI:d", "K", "D", "")],
        };
        assert_eq!(resolve_with(&repo, "K", "D").unwrap().id, "CLI:d");
        assert_eq!(resolve_with(&repo, "K", "OTHER").unwrap().id, "CLI:root");
        assert!(matches!(
            resolve_with(&repo, "MISSING", "X"),
            Err(CoreError::ClassificationNotFound { .. })
        ));
    }

    #[test]
    fn resolve_without_root_fails_for_other_domains() {
        let repo = FakeRepo {
            rows: vec![row("CLI:d", "K", "D", "")],
        };
        assert!(resolve_with(&repo, "K", "D").is_ok());
        assert!(resolve_with(&repo, "K", "E").unwrap_err().is_not_found());
    }

    #[test]
    fn forest_links_children_within_their_domain() {
        let forest = assemble_forest(vec![
            row("1", "A", "", ""),
            row("2", "B", "", "A"),
            row("3", "C", "D", "A"),
            row("4", "A", "D", ""),
        ]);
        assert_eq!(forest.len(), 2);
        let root_a = &forest[0];
        assert_eq!(root_a.classification.id, "1");
        assert_eq!(root_a.children.len(), 1);
        assert_eq!(root_a.children[0].classification.id, "2");
        let domain_a = &forest[1];
        assert_eq!(domain_a.classification.id, "4");
        assert_eq!(domain_a.children[0].classification.id, "3");
    }

    #[test]
    fn forest_surfaces_orphans_and_cycles() {
        let forest = assemble_forest(vec![
            row("1", "ORPHAN", "", "MISSING"),
            row("2", "X", "", "Y"),
            row("3", "Y", "", "X"),
            row("4", "SELF", "", "SELF"),
        ]);
        let total: usize = forest.iter().map(|node| node.subtree_size()).sum();
        assert_eq!(total, 4);
        assert_eq!(forest[0].classification.id, "1");
        assert!(forest
            .iter()
            .any(|node| node.classification.id == "2" && node.children.len() == 1));
        assert!(forest.iter().any(|node| node.classification.id == "4"));
    }
}
