use chrono::{NaiveDate, NaiveDateTime};
use workroute_core::{
    Classification, ClassificationService, CoreError, Engine, EngineConfig, FixedClock,
};

fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap()
}

fn engine() -> Engine {
    Engine::open_in_memory(EngineConfig::default())
        .unwrap()
        .with_clock(FixedClock(fixed_now()))
}

fn classification(key: &str, domain: &str) -> Classification {
    let mut classification = Classification::new(key, domain);
    classification.name = Some(format!("{key} in {domain:?}"));
    classification.kind = Some("TASK".to_string());
    classification
}

#[test]
fn resolve_falls_back_to_root_domain() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let root = service.create(classification("K", "")).unwrap();
    let specific = service.create(classification("K", "D")).unwrap();

    assert_eq!(service.resolve("K", "D").unwrap().id, specific.id);
    assert_eq!(service.resolve("K", "OTHER").unwrap().id, root.id);
    assert_eq!(service.resolve("K", "").unwrap().id, root.id);

    let err = service.resolve("MISSING", "X").unwrap_err();
    assert!(matches!(err, CoreError::ClassificationNotFound { .. }));
}

#[test]
fn create_assigns_identity_and_default_validity() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let created = service.create(classification("L10000", "")).unwrap();

    assert!(created.id.starts_with("CLI:"));
    assert_eq!(created.created, Some(fixed_now()));
    assert_eq!(created.modified, Some(fixed_now()));
    assert_eq!(created.valid_from, Some(fixed_now().date()));
    assert_eq!(
        created.valid_until,
        NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()
    );

    let loaded = service.get_by_id(&created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn domain_participates_in_identity() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    service.create(classification("K", "D")).unwrap();

    let err = service.create(classification("K", "D")).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ClassificationAlreadyExists { ref key, ref domain }
            if key == "K" && domain == "D"
    ));

    service.create(classification("K", "D2")).unwrap();

    let variants = service.list_all_with_key("K").unwrap();
    let domains: Vec<_> = variants.iter().map(|c| c.domain.as_str()).collect();
    assert_eq!(domains, vec!["", "D", "D2"]);
}

#[test]
fn domain_specific_create_adds_missing_root_once() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let mut specific = classification("dummy-key", "test-domain");
    specific.category = Some("EXTERN".to_string());
    let specific = service.create(specific).unwrap();

    let root = service.resolve("dummy-key", "").unwrap();
    assert_ne!(root.id, specific.id);
    assert!(root.id.starts_with("CLI:"));
    assert_eq!(root.category.as_deref(), Some("EXTERN"));
    assert!(root.created.is_some());

    service
        .create(classification("dummy-key", "test-domain_2"))
        .unwrap();
    let roots = service
        .create_query()
        .key(["dummy-key"])
        .domain([""])
        .list()
        .unwrap();
    assert_eq!(roots.len(), 1);
}

#[test]
fn create_rejects_invalid_input() {
    let engine = engine();
    let service = ClassificationService::new(&engine);

    let mut invalid = classification("K", "D");
    invalid.service_level = Some("ASAP".to_string());
    assert!(matches!(
        service.create(invalid).unwrap_err(),
        CoreError::InvalidArgument(_)
    ));

    assert!(matches!(
        service.create(classification("", "D")).unwrap_err(),
        CoreError::InvalidArgument(_)
    ));
    let mut negative = classification("K", "D");
    negative.service_level = Some("-P2D".to_string());
    assert!(matches!(
        service.create(negative).unwrap_err(),
        CoreError::InvalidArgument(_)
    ));
    assert!(service.list_all_with_key("K").unwrap().is_empty());
}

#[test]
fn update_touches_modified_and_resets_valid_from() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let mut original = classification("K", "");
    original.valid_from = NaiveDate::from_ymd_opt(2020, 1, 1);
    let mut created = service.create(original).unwrap();
    assert_eq!(created.valid_from, NaiveDate::from_ymd_opt(2020, 1, 1));

    created.description = Some("TEST SOMETHING".to_string());
    let updated = service.update(created.clone()).unwrap();
    assert_eq!(updated.valid_from, Some(fixed_now().date()));
    assert_eq!(updated.modified, Some(fixed_now()));
    assert_eq!(updated.created, created.created);

    let loaded = service.resolve("K", "").unwrap();
    assert_eq!(loaded.description.as_deref(), Some("TEST SOMETHING"));
    assert_eq!(loaded.valid_from, Some(fixed_now().date()));
}

#[test]
fn update_with_expired_validity_is_an_argument_error() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let mut original = classification("K", "");
    original.valid_from = NaiveDate::from_ymd_opt(2020, 1, 1);
    original.valid_until = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let created = service.create(original).unwrap();

    let mut edited = created.clone();
    edited.description = Some("changed".to_string());
    assert!(matches!(
        service.update(edited).unwrap_err(),
        CoreError::InvalidArgument(_)
    ));

    let loaded = service.resolve("K", "").unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn update_reports_unknown_ids_and_collisions() {
    let engine = engine();
    let service = ClassificationService::new(&engine);

    let mut unknown = classification("K", "");
    unknown.id = "CLI:missing".to_string();
    assert!(matches!(
        service.update(unknown).unwrap_err(),
        CoreError::ClassificationNotFound { .. }
    ));

    let mut specific = service.create(classification("K", "D")).unwrap();
    specific.domain = String::new();
    assert!(matches!(
        service.update(specific).unwrap_err(),
        CoreError::ClassificationAlreadyExists { .. }
    ));
}

#[test]
fn tree_groups_children_under_parents() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let parent = service.create(classification("P", "")).unwrap();
    service.create(classification("Q", "")).unwrap();
    let mut child = classification("C", "");
    child.parent_classification_key = parent.key.clone();
    service.create(child).unwrap();

    let forest = service.get_tree().unwrap();
    assert_eq!(forest.len(), 2);
    let total: usize = forest.iter().map(|node| node.subtree_size()).sum();
    assert_eq!(total, 3);

    let p = forest
        .iter()
        .find(|node| node.classification.key == "P")
        .unwrap();
    assert_eq!(p.children.len(), 1);
    assert_eq!(p.children[0].classification.key, "C");
}
