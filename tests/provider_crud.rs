mod common;

use common::{CacheEntry, Child, CrudTest, Parent, SimpleEntity, caller, file_provider, memory_provider, temp_dir};
use strata::error::ErrorKind;
use strata::mapper::SelectOptions;
use strata::predicate::{OrderKey, Predicate, col, val};
use strata::provider::{PurgeMode, PurgeOptions};
use strata::value::Value;

fn id(text: &str) -> Value {
    Value::Text(text.to_string())
}

#[test]
fn create_then_get_returns_the_stored_entity() {
    let mut provider = memory_provider::<SimpleEntity>();
    let caller = caller();

    let created = provider
        .create(&SimpleEntity::new("u1", "A", 20), &caller)
        .expect("create");
    assert_eq!(created.version, 1);

    let read = provider
        .get(&id("u1"), &caller)
        .expect("get")
        .expect("present");
    assert_eq!(read.id, "u1");
    assert_eq!(read.name, "A");
    assert_eq!(read.age, 20);
    assert_eq!(read.version, 1);
    assert_eq!(read.created, read.written, "create stamps one timestamp");
    assert!(read.created.is_some());
}

#[test]
fn get_missing_returns_none() {
    let provider = memory_provider::<SimpleEntity>();
    let read = provider.get(&id("nope"), &caller()).expect("get");
    assert!(read.is_none());
}

#[test]
fn duplicate_create_is_already_exists() {
    let mut provider = memory_provider::<SimpleEntity>();
    let caller = caller();

    provider
        .create(&SimpleEntity::new("dup", "A", 1), &caller)
        .expect("first create");
    let err = provider
        .create(&SimpleEntity::new("dup", "B", 2), &caller)
        .expect_err("second create must fail");
    assert_eq!(err.kind(), ErrorKind::EntityAlreadyExists);
}

#[test]
fn update_bumps_version_and_checks_expectation() {
    let mut provider = memory_provider::<SimpleEntity>();
    let caller = caller();

    let mut entity = provider
        .create(&SimpleEntity::new("u2", "before", 30), &caller)
        .expect("create");

    entity.name = "after".to_string();
    let updated = provider.update(&entity, &caller).expect("update");
    assert_eq!(updated.version, 2);

    let read = provider
        .get(&id("u2"), &caller)
        .expect("get")
        .expect("present");
    assert_eq!(read.name, "after");
    assert_eq!(read.version, 2);
    assert!(read.written >= read.created);
}

#[test]
fn stale_version_update_is_a_concurrency_conflict() {
    let mut provider = memory_provider::<SimpleEntity>();
    let caller = caller();

    let created = provider
        .create(&SimpleEntity::new("u3", "A", 1), &caller)
        .expect("create");
    assert_eq!(created.version, 1);

    let mut stale = created.clone();
    stale.version = 0;
    stale.name = "loser".to_string();
    let err = provider.update(&stale, &caller).expect_err("stale update");
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
}

#[test]
fn concurrent_updates_admit_exactly_one_winner() {
    let mut provider = memory_provider::<SimpleEntity>();
    let caller = caller();

    let created = provider
        .create(&SimpleEntity::new("u4", "A", 1), &caller)
        .expect("create");

    let mut first = created.clone();
    first.name = "winner".to_string();
    let mut second = created.clone();
    second.name = "loser".to_string();

    provider.update(&first, &caller).expect("first writer wins");
    let err = provider
        .update(&second, &caller)
        .expect_err("second writer conflicts");
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

    let read = provider
        .get(&id("u4"), &caller)
        .expect("get")
        .expect("present");
    assert_eq!(read.name, "winner");
}

#[test]
fn update_of_missing_entity_is_not_found() {
    let mut provider = memory_provider::<SimpleEntity>();
    let mut ghost = SimpleEntity::new("ghost", "x", 1);
    ghost.version = 1;
    let err = provider.update(&ghost, &caller()).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::EntityNotFound);
}

#[test]
fn delete_is_idempotent() {
    let mut provider = memory_provider::<SimpleEntity>();
    let caller = caller();

    provider
        .create(&SimpleEntity::new("u5", "A", 1), &caller)
        .expect("create");

    provider.delete(&id("u5"), &caller).expect("first delete");
    provider.delete(&id("u5"), &caller).expect("second delete is a no-op");
    assert!(provider.get(&id("u5"), &caller).expect("get").is_none());
}

#[test]
fn check_constraint_violation_is_data_integrity() {
    let mut provider = memory_provider::<SimpleEntity>();
    let err = provider
        .create(&SimpleEntity::new("neg", "A", -5), &caller())
        .expect_err("negative age violates the check");
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
}

#[test]
fn batch_create_inserts_every_row() {
    let mut provider = memory_provider::<CrudTest>();
    let caller = caller();

    let rows: Vec<CrudTest> = (0..23)
        .map(|i| CrudTest::new(&format!("b-{i:02}"), &format!("row {i}"), "Active"))
        .collect();
    provider
        .create_many(&rows, &caller, Some(5))
        .expect("batched create");

    assert_eq!(provider.count(None).expect("count"), 23);

    // Rows within one batch share a timestamp.
    let first = provider
        .get(&id("b-00"), &caller)
        .expect("get")
        .expect("present");
    let fourth = provider
        .get(&id("b-04"), &caller)
        .expect("get")
        .expect("present");
    assert_eq!(first.created, fourth.created);
}

#[test]
fn failing_batch_rolls_back_only_its_chunk() {
    let mut provider = memory_provider::<CrudTest>();
    let caller = caller();

    provider
        .create(&CrudTest::new("dup-batch", "existing", "Active"), &caller)
        .expect("seed");

    // Three chunks of 2; the second chunk holds the duplicate key.
    let rows = vec![
        CrudTest::new("n-1", "a", "Active"),
        CrudTest::new("n-2", "b", "Active"),
        CrudTest::new("n-3", "c", "Active"),
        CrudTest::new("dup-batch", "collides", "Active"),
        CrudTest::new("n-5", "e", "Active"),
        CrudTest::new("n-6", "f", "Active"),
    ];
    let err = provider
        .create_many(&rows, &caller, Some(2))
        .expect_err("duplicate key aborts its batch");
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);

    // First chunk committed, failing chunk rolled back entirely, later
    // chunks never ran.
    let all = provider.get_all(&caller).expect("list");
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"n-1"));
    assert!(ids.contains(&"n-2"));
    assert!(!ids.contains(&"n-3"));
    assert!(!ids.contains(&"n-5"));
}

#[test]
fn query_translates_predicates_with_order_and_paging() {
    let mut provider = memory_provider::<CrudTest>();
    let caller = caller();

    for (i, status) in ["Active", "Active", "Inactive", "Active", "Archived"]
        .iter()
        .enumerate()
    {
        provider
            .create(
                &CrudTest::new(&format!("q-{i}"), &format!("item {i}"), status),
                &caller,
            )
            .expect("create");
    }

    let active = provider
        .query(
            Some(&col("Status").eq(val("Active"))),
            &SelectOptions {
                order_by: vec![OrderKey::desc("Id")],
                ..SelectOptions::default()
            },
            &caller,
        )
        .expect("query");
    let ids: Vec<&str> = active.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["q-3", "q-1", "q-0"]);

    let page = provider
        .query(
            Some(&col("Status").eq(val("Active"))),
            &SelectOptions {
                order_by: vec![OrderKey::asc("Id")],
                skip: Some(1),
                take: Some(1),
                ..SelectOptions::default()
            },
            &caller,
        )
        .expect("paged query");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "q-1");
}

#[test]
fn query_supports_contains_and_in() {
    let mut provider = memory_provider::<CrudTest>();
    let caller = caller();

    provider
        .create(&CrudTest::new("c-1", "alpha report", "Active"), &caller)
        .expect("create");
    provider
        .create(&CrudTest::new("c-2", "beta summary", "Inactive"), &caller)
        .expect("create");

    let matches = provider
        .query(
            Some(&Predicate::contains("Name", "report")),
            &SelectOptions::default(),
            &caller,
        )
        .expect("contains query");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "c-1");

    let by_status = provider
        .query(
            Some(&Predicate::in_values(
                "Status",
                vec![Value::from("Active"), Value::from("Inactive")],
            )),
            &SelectOptions::default(),
            &caller,
        )
        .expect("in query");
    assert_eq!(by_status.len(), 2);
}

#[test]
fn count_and_exists_share_the_predicate_path() {
    let mut provider = memory_provider::<CrudTest>();
    let caller = caller();

    provider
        .create(&CrudTest::new("e-1", "x", "Active"), &caller)
        .expect("create");

    assert_eq!(provider.count(None).expect("count all"), 1);
    assert!(provider
        .exists(&col("Status").eq(val("Active")))
        .expect("exists"));
    assert!(!provider
        .exists(&col("Status").eq(val("Archived")))
        .expect("exists"));
}

#[test]
fn purge_expired_previews_then_deletes() {
    let mut provider = memory_provider::<CacheEntry>();
    let caller = caller();

    let mut stale = CacheEntry::new("stale", "old");
    stale.expires = Some(chrono::Utc::now() - chrono::Duration::try_hours(2).unwrap());
    provider.create(&stale, &caller).expect("create stale");

    // Fresh entry gets its deadline stamped from the schema's expiry span.
    let fresh = provider
        .create(&CacheEntry::new("fresh", "new"), &caller)
        .expect("create fresh");
    assert!(fresh.expires.is_some(), "expiry span stamps the deadline");

    let preview = provider
        .purge(
            None,
            &PurgeOptions {
                mode: PurgeMode::Expired,
                preview: true,
                vacuum: false,
            },
            &caller,
        )
        .expect("preview");
    assert_eq!(preview, 1);
    assert_eq!(provider.count(None).expect("count"), 2, "preview deletes nothing");

    let removed = provider
        .purge(
            None,
            &PurgeOptions {
                mode: PurgeMode::Expired,
                preview: false,
                vacuum: true,
            },
            &caller,
        )
        .expect("purge");
    assert_eq!(removed, 1);
    assert!(provider.get(&id("stale"), &caller).expect("get").is_none());
    assert!(provider.get(&id("fresh"), &caller).expect("get").is_some());
}

#[test]
fn purge_by_predicate_requires_a_predicate() {
    let mut provider = memory_provider::<CrudTest>();
    let err = provider
        .purge(
            None,
            &PurgeOptions {
                mode: PurgeMode::ByPredicate,
                preview: false,
                vacuum: false,
            },
            &caller(),
        )
        .expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn purge_by_predicate_removes_matches() {
    let mut provider = memory_provider::<CrudTest>();
    let caller = caller();

    provider
        .create(&CrudTest::new("p-1", "keep", "Active"), &caller)
        .expect("create");
    provider
        .create(&CrudTest::new("p-2", "drop", "Archived"), &caller)
        .expect("create");

    let removed = provider
        .purge(
            Some(&col("Status").eq(val("Archived"))),
            &PurgeOptions {
                mode: PurgeMode::ByPredicate,
                preview: false,
                vacuum: false,
            },
            &caller,
        )
        .expect("purge");
    assert_eq!(removed, 1);
    assert_eq!(provider.count(None).expect("count"), 1);
}

#[test]
fn deleting_a_parent_cascades_to_children() {
    let dir = temp_dir();
    let mut parents = file_provider::<Parent>(&dir);
    let mut children = file_provider::<Child>(&dir);
    let caller = caller();

    parents.create(&Parent::new("p1"), &caller).expect("parent");
    for child_id in ["c1", "c2", "c3"] {
        children
            .create(&Child::new(child_id, "p1"), &caller)
            .expect("child");
    }
    assert_eq!(children.count(None).expect("count"), 3);

    parents.delete(&id("p1"), &caller).expect("delete parent");

    let remaining = children.get_all(&caller).expect("list children");
    assert!(remaining.is_empty(), "cascade removed all children");
}

#[test]
fn child_with_unknown_parent_is_rejected_when_fk_is_on() {
    let dir = temp_dir();
    // Initializing the parent provider creates the referenced table.
    let parents = file_provider::<Parent>(&dir);
    drop(parents);
    let mut children = file_provider::<Child>(&dir);

    let err = children
        .create(&Child::new("orphan", "missing"), &caller())
        .expect_err("fk violation");
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
}

#[test]
fn operations_fail_before_initialize_and_after_dispose() {
    common::init_test_logging();
    let mut provider = strata::Provider::<SimpleEntity>::open_memory(
        strata::EngineConfig::default(),
    )
    .expect("open");
    let caller = caller();

    let err = provider
        .create(&SimpleEntity::new("x", "x", 1), &caller)
        .expect_err("not initialized");
    assert_eq!(err.kind(), ErrorKind::Misconfiguration);

    provider.initialize().expect("initialize");
    provider.initialize().expect("initialize is idempotent");
    assert_eq!(provider.state(), strata::ProviderState::Ready);

    provider.dispose();
    assert_eq!(provider.state(), strata::ProviderState::Disposed);
    let err = provider
        .get(&id("x"), &caller)
        .expect_err("disposed provider rejects reads");
    assert_eq!(err.kind(), ErrorKind::Misconfiguration);
}

#[test]
fn mutations_write_audit_records() {
    let dir = temp_dir();
    let mut provider = file_provider::<SimpleEntity>(&dir);
    let caller = caller();

    let entity = provider
        .create(&SimpleEntity::new("a-1", "x", 1), &caller)
        .expect("create");
    let mut updated = entity.clone();
    updated.name = "y".to_string();
    provider.update(&updated, &caller).expect("update");
    provider.delete(&id("a-1"), &caller).expect("delete");

    let conn = rusqlite::Connection::open(dir.path().join("strata.db")).expect("open raw");
    let operations: Vec<String> = conn
        .prepare("SELECT Operation FROM AuditRecords WHERE EntityKey = 'a-1' ORDER BY Id")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("collect");
    assert_eq!(operations, vec!["create", "update", "delete"]);

    let user: String = conn
        .query_row(
            "SELECT DISTINCT UserId FROM AuditRecords WHERE EntityKey = 'a-1'",
            [],
            |row| row.get(0),
        )
        .expect("user");
    assert_eq!(user, "tester");
}
