//! Contract Test: Engine State Model
//!
//! Constraints verified:
//! - State is recorded after every successful lifecycle call
//! - A fresh engine over the same state file converges without writes
//! - A vanished object is recreated by the next apply
//! - A failed delete keeps the record; a successful one drops it
//! - Every outcome is reported on the event channel
//!
//! If this test fails, state management is broken.

mod common;

use common::*;
use ldapobj_core::engine::{Change, EngineEvent, PlannedAction};
use ldapobj_core::model::{DesiredState, MutationOp};
use ldapobj_core::state::{FileStateStore, MemoryStateStore};
use ldapobj_core::traits::{Directory, StateStore};
use ldapobj_core::{EngineConfig, Error, ReconcileEngine};
use tokio::sync::mpsc;

const DN: &str = "cn=test,dc=example,dc=com";

fn desired() -> DesiredState {
    DesiredState::new(DN, ["person"])
        .with_attribute("cn", ["test"])
        .with_attribute("sn", ["test"])
}

fn engine_with(
    directory: &RecordingDirectory,
    store: Box<dyn StateStore>,
) -> (ReconcileEngine, mpsc::Receiver<EngineEvent>) {
    ReconcileEngine::new(Box::new(directory.clone()), store, EngineConfig::default())
        .expect("engine construction succeeds")
}

fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn restart_over_state_file_does_not_rewrite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state.json");
    let directory = RecordingDirectory::new();

    {
        let store = FileStateStore::new(&path).await.expect("store opens");
        let (engine, _events) = engine_with(&directory, Box::new(store));
        engine.apply("test", desired()).await.expect("create succeeds");
        engine.flush().await.expect("flush succeeds");
    }

    let store = FileStateStore::new(&path).await.expect("store reopens");
    let (engine, _events) = engine_with(&directory, Box::new(store));

    directory.clear_calls();
    assert_eq!(
        engine.plan("test", desired()).await.expect("plan succeeds"),
        PlannedAction::NoOp
    );
    let outcome = engine.apply("test", desired()).await.expect("apply succeeds");
    assert_eq!(outcome.change, Change::Unchanged);
    assert!(directory.writes().is_empty());
}

#[tokio::test]
async fn update_is_recorded_and_reported() {
    let directory = RecordingDirectory::new();
    let (engine, mut events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine.apply("test", desired()).await.expect("create succeeds");
    let created_at = engine.record("test").await.unwrap().expect("record").last_updated;

    let changed = desired().with_attribute("mail", ["test@example.com"]);
    engine.apply("test", changed).await.expect("update succeeds");

    let record = engine.record("test").await.unwrap().expect("record");
    assert!(record.last_updated >= created_at);
    assert_eq!(record.state.attributes["mail"], vec!["test@example.com"]);

    assert_eq!(
        drain(&mut events),
        vec![
            EngineEvent::ObjectCreated {
                name: "test".to_string(),
                dn: DN.to_string(),
            },
            EngineEvent::ObjectUpdated {
                name: "test".to_string(),
                dn: DN.to_string(),
                operations: vec![MutationOp::AddAttribute {
                    attribute_type: "mail".to_string(),
                    values: vec!["test@example.com".to_string()],
                }],
            },
        ]
    );
}

#[tokio::test]
async fn reported_operations_are_masked() {
    let directory = RecordingDirectory::new();
    let (engine, mut events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine
        .apply("test", desired().with_attribute("userPassword", ["one"]))
        .await
        .expect("create succeeds");
    drain(&mut events);

    engine
        .apply("test", desired().with_attribute("userPassword", ["two"]))
        .await
        .expect("update succeeds");

    let reported = drain(&mut events);
    let EngineEvent::ObjectUpdated { operations, .. } = &reported[0] else {
        panic!("expected an update event, got {:?}", reported);
    };
    assert_eq!(operations[0].values(), ["<REDACTED>".to_string()]);

    // The directory still received the real value
    let entry = directory.memory().entry(DN).await.expect("entry exists");
    assert_eq!(entry.attributes["userPassword"], vec!["two"]);
}

#[tokio::test]
async fn vanished_object_is_recreated() {
    let directory = RecordingDirectory::new();
    let (engine, mut events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine.apply("test", desired()).await.expect("create succeeds");
    directory.memory().delete(DN).await.expect("out-of-band delete");

    assert_eq!(
        engine.plan("test", desired()).await.expect("plan succeeds"),
        PlannedAction::Create
    );

    let outcome = engine.apply("test", desired()).await.expect("apply succeeds");
    assert_eq!(outcome.change, Change::Created);
    assert!(directory.memory().entry(DN).await.is_some());
    assert_eq!(drain(&mut events).len(), 2);
}

#[tokio::test]
async fn refresh_of_vanished_object_drops_record() {
    let directory = RecordingDirectory::new();
    let (engine, mut events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine.apply("test", desired()).await.expect("create succeeds");
    directory.memory().delete(DN).await.expect("out-of-band delete");
    drain(&mut events);

    assert!(engine.refresh("test").await.expect("refresh succeeds").is_none());
    assert!(engine.state("test").await.unwrap().is_none());
    assert_eq!(
        drain(&mut events),
        vec![EngineEvent::ObjectVanished {
            name: "test".to_string(),
            dn: DN.to_string(),
        }]
    );
}

#[tokio::test]
async fn destroy_drops_record_only_on_success() {
    let directory = RecordingDirectory::new();
    let (engine, _events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine.apply("test", desired()).await.expect("create succeeds");

    directory.fail_deletes();
    let err = engine.destroy("test").await.unwrap_err();
    assert!(matches!(err, Error::DirectoryWrite { .. }));
    assert!(engine.state("test").await.unwrap().is_some());

    let healthy = RecordingDirectory::new();
    let store = MemoryStateStore::new();
    let (engine, _events) = engine_with(&healthy, Box::new(store.clone()));
    engine.apply("test", desired()).await.expect("create succeeds");
    engine.destroy("test").await.expect("destroy succeeds");

    assert!(store.is_empty().await);
    assert!(healthy.memory().is_empty().await);
}

#[tokio::test]
async fn import_refuses_a_managed_name() {
    let directory = RecordingDirectory::new();
    let (engine, _events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine.apply("test", desired()).await.expect("create succeeds");

    let err = engine.import("test", DN, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn dn_change_is_reported_as_recreate() {
    let directory = RecordingDirectory::new();
    let (engine, mut events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    engine.apply("test", desired()).await.expect("create succeeds");
    drain(&mut events);

    let mut moved = desired();
    moved.dn = "cn=moved,dc=example,dc=com".to_string();
    assert_eq!(
        engine.plan("test", moved.clone()).await.expect("plan succeeds"),
        PlannedAction::Replace {
            old_dn: DN.to_string(),
            new_dn: "cn=moved,dc=example,dc=com".to_string(),
        }
    );
    engine.apply("test", moved).await.expect("apply succeeds");

    assert_eq!(
        drain(&mut events),
        vec![EngineEvent::ObjectRecreated {
            name: "test".to_string(),
            old_dn: DN.to_string(),
            new_dn: "cn=moved,dc=example,dc=com".to_string(),
        }]
    );
    let state = engine.state("test").await.unwrap().expect("state recorded");
    assert_eq!(state.id, "cn=moved,dc=example,dc=com");
}

#[tokio::test]
async fn dn_change_keeps_ignored_attributes_on_the_new_entry() {
    let directory = RecordingDirectory::new();
    let (engine, _events) = engine_with(&directory, Box::new(MemoryStateStore::new()));

    let original = DesiredState::new(DN, ["person"])
        .with_attribute("sn", ["s"])
        .with_attribute("userPassword", ["pw"])
        .with_ignored("userPassword");
    engine.apply("test", original.clone()).await.expect("create succeeds");

    let mut moved = original;
    moved.dn = "cn=moved,dc=example,dc=com".to_string();
    let outcome = engine.apply("test", moved).await.expect("apply succeeds");
    assert_eq!(
        outcome.change,
        Change::Recreated {
            old_dn: DN.to_string()
        }
    );

    let entry = directory
        .memory()
        .entry("cn=moved,dc=example,dc=com")
        .await
        .expect("new entry exists");
    assert_eq!(entry.attributes["userPassword"], vec!["pw"]);
    assert_eq!(entry.attributes["sn"], vec!["s"]);

    let state = engine.state("test").await.unwrap().expect("state recorded");
    assert!(!state.attributes.contains_key("userPassword"));
}
