use chrono::{NaiveDate, NaiveDateTime};
use workroute_core::{
    Classification, ClassificationService, CoreError, Engine, EngineConfig, FixedClock,
};

fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn engine() -> Engine {
    Engine::open_in_memory(EngineConfig::default())
        .unwrap()
        .with_clock(FixedClock(fixed_now()))
}

fn create(
    service: &ClassificationService<'_>,
    key: &str,
    domain: &str,
    edit: impl FnOnce(&mut Classification),
) -> Classification {
    let mut classification = Classification::new(key, domain);
    edit(&mut classification);
    service.create(classification).unwrap()
}

fn keys(rows: &[Classification]) -> Vec<&str> {
    let mut keys: Vec<_> = rows.iter().map(|row| row.key.as_str()).collect();
    keys.sort_unstable();
    keys
}

#[test]
fn category_and_domain_filters_combine() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    create(&service, "K1", "", |_| {});
    let b = create(&service, "K1", "T", |c| c.category = Some("c1".to_string()));
    create(&service, "K1", "T2", |c| c.category = Some("c2".to_string()));

    let found = service
        .create_query()
        .category(["c1"])
        .domain(["T"])
        .list()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, b.id);

    let found = service.create_query().domain(["T", "T3"]).list().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, b.id);

    let all_variants = service.create_query().key(["K1"]).list().unwrap();
    assert_eq!(all_variants.len(), 3);
}

#[test]
fn description_like_passes_patterns_through() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    create(&service, "A", "", |c| c.description = Some("desc1".to_string()));
    create(&service, "B", "", |c| c.description = Some("desc2".to_string()));
    create(&service, "C", "", |c| c.description = Some("DESC1".to_string()));
    create(&service, "D", "", |c| c.description = Some("other".to_string()));

    let found = service.create_query().description_like("desc%").list().unwrap();
    assert_eq!(keys(&found), vec!["A", "B"]);

    let found = service.create_query().description_like("DESC1").list().unwrap();
    assert_eq!(keys(&found), vec!["C"]);

    let found = service.create_query().description_like("%1").list().unwrap();
    assert_eq!(found.len(), 2);

    let found = service.create_query().description_like("desc_").list().unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn custom_fields_match_any_column() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    create(&service, "A", "", |c| {
        c.set_custom_field(1, Some("custom1".to_string()));
    });
    create(&service, "B", "", |c| {
        c.set_custom_field(10, Some("custom1".to_string()));
    });
    create(&service, "C", "", |c| {
        c.set_custom_field(3, Some("custom2".to_string()));
    });
    create(&service, "D", "", |_| {});

    let one = service.create_query().custom_fields(["custom1"]).list().unwrap();
    assert_eq!(keys(&one), vec!["A", "B"]);

    let two = service
        .create_query()
        .custom_fields(["custom1", "custom2"])
        .list()
        .unwrap();
    assert_eq!(two.len(), 3);

    let combined = service
        .create_query()
        .custom_fields(["custom1"])
        .key(["B", "C"])
        .list()
        .unwrap();
    assert_eq!(keys(&combined), vec!["B"]);

    assert!(service
        .create_query()
        .custom_fields(["nothing"])
        .list()
        .unwrap()
        .is_empty());
}

#[test]
fn scalar_dimensions_filter_exact_values() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    create(&service, "PARENT", "", |c| {
        c.priority = 1;
        c.kind = Some("TASK".to_string());
        c.service_level = Some("P1D".to_string());
        c.application_entry_point = Some("app://one".to_string());
    });
    create(&service, "CHILD_1", "", |c| {
        c.priority = 2;
        c.kind = Some("DOCUMENT".to_string());
        c.parent_classification_key = "PARENT".to_string();
        c.service_level = Some("P1DT1H".to_string());
        c.name = Some("first child".to_string());
    });
    create(&service, "CHILD_2", "", |c| {
        c.priority = 3;
        c.kind = Some("TASK".to_string());
        c.parent_classification_key = "PARENT".to_string();
        c.service_level = Some("P1D".to_string());
    });

    let q = || service.create_query();
    assert_eq!(q().priority([1, 2]).list().unwrap().len(), 2);
    assert_eq!(q().classification_type(["TASK"]).list().unwrap().len(), 2);
    assert_eq!(
        keys(&q().parent_classification_key(["PARENT"]).list().unwrap()),
        vec!["CHILD_1", "CHILD_2"]
    );
    assert_eq!(
        keys(&q().parent_classification_key([""]).list().unwrap()),
        vec!["PARENT"]
    );
    assert_eq!(q().service_level(["P1D"]).list().unwrap().len(), 2);
    assert_eq!(q().name(["first child"]).list().unwrap().len(), 1);
    assert_eq!(
        q().application_entry_point(["app://one"]).list().unwrap().len(),
        1
    );
    assert_eq!(
        q().service_level(["P1D"]).classification_type(["DOCUMENT"]).list().unwrap().len(),
        0
    );
}

#[test]
fn date_dimensions_match_calendar_days() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    create(&service, "A", "", |_| {});
    create(&service, "B", "", |c| c.valid_from = NaiveDate::from_ymd_opt(2023, 6, 1));
    create(&service, "C", "", |c| {
        c.valid_until = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    });
    let today = fixed_now().date();

    let found = service
        .create_query()
        .valid_in_domain(true)
        .created([today])
        .valid_from([today])
        .valid_until([NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()])
        .list()
        .unwrap();
    assert_eq!(keys(&found), vec!["A"]);

    let yesterday = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    assert!(service.create_query().created([yesterday]).list().unwrap().is_empty());
    assert_eq!(
        service.create_query().created([yesterday, today]).list().unwrap().len(),
        3
    );
    assert!(service.create_query().valid_in_domain(false).list().unwrap().is_empty());
}

#[test]
fn paging_follows_list_order() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    for index in 0..5 {
        create(&service, &format!("K{index}"), "", |_| {});
    }

    let all = service.create_query().list().unwrap();
    assert_eq!(all.len(), 5);
    let mut ids: Vec<_> = all.iter().map(|row| row.id.clone()).collect();
    ids.sort();
    assert_eq!(
        ids,
        all.iter().map(|row| row.id.clone()).collect::<Vec<_>>()
    );

    let page = service.create_query().list_page(1, 2).unwrap();
    assert_eq!(page, all[1..3].to_vec());
    assert_eq!(service.create_query().list_page(4, 10).unwrap().len(), 1);
    assert!(service.create_query().list_page(5, 1).unwrap().is_empty());
    assert!(service.create_query().list_page(0, 0).unwrap().is_empty());
    assert_eq!(service.create_query().count().unwrap(), 5);
}

#[test]
fn single_fails_on_ambiguous_filters() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    create(&service, "K1", "T", |_| {});
    create(&service, "K1", "T2", |_| {});

    let one = service
        .create_query()
        .key(["K1"])
        .domain(["T"])
        .single()
        .unwrap();
    assert_eq!(one.map(|c| c.domain), Some("T".to_string()));

    assert!(service.create_query().key(["missing"]).single().unwrap().is_none());

    let err = service.create_query().key(["K1"]).single().unwrap_err();
    assert!(matches!(err, CoreError::AmbiguousResult(3)));
}

#[test]
fn built_filter_reflects_setters() {
    let engine = engine();
    let service = ClassificationService::new(&engine);
    let filter = service
        .create_query()
        .key(["A", "B"])
        .domain([""])
        .description_like("x%")
        .build();
    assert_eq!(filter.keys, vec!["A", "B"]);
    assert_eq!(filter.domains, vec![""]);
    assert_eq!(filter.description_like.as_deref(), Some("x%"));
    assert!(filter.categories.is_empty());
}
