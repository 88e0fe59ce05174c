//! Issue aggregation concurrency and persistence tests.

use std::sync::Arc;

use metadata_store::{IssueStatus, IssueStore};
use pipeline_core::{fingerprint, EventRecord, EventType};

fn error_event() -> EventRecord {
    let mut event = EventRecord::new(EventType::Error, "org-test", "proj-test");
    event.exception_type = Some("NSInvalidArgumentException".into());
    event.stack_trace = Some(vec![pipeline_core::StackFrame {
        module: "MyApp".into(),
        function: "foo".into(),
        file: None,
        line: None,
    }]);
    event
}

#[test]
fn test_concurrent_bumps_one_store() {
    let store = Arc::new(IssueStore::open_in_memory().unwrap());
    let event = error_event();
    let print = fingerprint(&event);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            let event = event.clone();
            let print = print.clone();
            std::thread::spawn(move || {
                store
                    .find_or_create_and_bump(&event.project_id, &print, &event)
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Exactly one row, both increments applied: no duplicate issue, no
    // lost update.
    assert_eq!(store.count_for_project("proj-test").unwrap(), 1);
    let issue = store.get("proj-test", &print).unwrap().unwrap();
    assert_eq!(issue.occurrence_count, 2);
}

#[test]
fn test_concurrent_bumps_separate_connections() {
    // Two stores over the same database file model two worker
    // processes: the uniqueness constraint is the arbiter, not any
    // in-process lock.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.db");

    let store_a = Arc::new(IssueStore::open(&path).unwrap());
    let store_b = Arc::new(IssueStore::open(&path).unwrap());

    let event = error_event();
    let print = fingerprint(&event);

    let spawn = |store: Arc<IssueStore>| {
        let event = event.clone();
        let print = print.clone();
        std::thread::spawn(move || {
            store
                .find_or_create_and_bump(&event.project_id, &print, &event)
                .unwrap()
        })
    };

    let a = spawn(store_a.clone());
    let b = spawn(store_b.clone());
    a.join().unwrap();
    b.join().unwrap();

    assert_eq!(store_a.count_for_project("proj-test").unwrap(), 1);
    let issue = store_b.get("proj-test", &print).unwrap().unwrap();
    assert_eq!(issue.occurrence_count, 2);
}

#[test]
fn test_many_concurrent_bumps_converge() {
    let store = Arc::new(IssueStore::open_in_memory().unwrap());
    let event = error_event();
    let print = fingerprint(&event);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            let event = event.clone();
            let print = print.clone();
            std::thread::spawn(move || {
                store
                    .find_or_create_and_bump(&event.project_id, &print, &event)
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let issue = store.get("proj-test", &print).unwrap().unwrap();
    assert_eq!(issue.occurrence_count, 16);
    assert_eq!(store.count_for_project("proj-test").unwrap(), 1);
}

#[test]
fn test_issues_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.db");
    let event = error_event();
    let print = fingerprint(&event);

    {
        let store = IssueStore::open(&path).unwrap();
        let issue = store
            .find_or_create_and_bump(&event.project_id, &print, &event)
            .unwrap();
        store.resolve(&issue.public_id).unwrap();
    }

    let store = IssueStore::open(&path).unwrap();
    let issue = store.get("proj-test", &print).unwrap().unwrap();
    assert_eq!(issue.status, IssueStatus::Resolved);
    assert_eq!(issue.occurrence_count, 1);

    // The reopened store still reopens resolved issues on new events.
    let bumped = store
        .find_or_create_and_bump(&event.project_id, &print, &event)
        .unwrap();
    assert_eq!(bumped.status, IssueStatus::Open);
    assert_eq!(bumped.occurrence_count, 2);
}
