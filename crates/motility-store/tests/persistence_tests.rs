//! Integration tests for persist-and-reload behavior.

use std::sync::Arc;

use motility_core::{
    AnalysisParameters, AnalysisState, FailureCause, HistoryEntry, InputRef, RecordPatch,
    RemoteId, ResultPayload,
};
use motility_store::{
    ANALYSES_KEY, HISTORY_KEY, JsonFileKeyValueStore, KeyValueStore, LifecycleStore,
    MemoryKeyValueStore,
};
use serde_json::json;

fn completed_payload() -> ResultPayload {
    serde_json::from_value(json!({
        "summary": {"total_sperm": 120, "motile_sperm": 80, "motility_percentage": 66.7}
    }))
    .expect("payload fixture should parse")
}

fn populate(store: &LifecycleStore, count: usize) {
    for index in 0..count {
        let record = store.create(
            InputRef::new(format!("/videos/sample-{index}.mp4")).with_mime_type("video/mp4"),
            AnalysisParameters::new().with("frame_rate", index as u64),
        );
        store
            .update(&record.id, RecordPatch::submitting())
            .expect("submitting should apply");
        match index % 3 {
            0 => {
                store
                    .update(
                        &record.id,
                        RecordPatch::processing(
                            RemoteId::new(format!("job-{index}")).unwrap(),
                            Some("Video uploaded successfully".to_string()),
                            Some("2-5 minutes".to_string()),
                        ),
                    )
                    .expect("processing should apply");
                store
                    .update(&record.id, RecordPatch::completed(completed_payload()))
                    .expect("completion should apply");
            }
            1 => {
                store
                    .update(&record.id, RecordPatch::failed(FailureCause::user_cancelled()))
                    .expect("failure should apply");
            }
            _ => {}
        }
    }
}

#[test]
fn persistence_tests_reload_reproduces_records_field_for_field() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let backend = Arc::new(JsonFileKeyValueStore::open(dir.path()).expect("backend should open"));

    let store = LifecycleStore::open(backend.clone());
    populate(&store, 12);
    store.replace_history(vec![HistoryEntry {
        id: "job-0".to_string(),
        remote_id: RemoteId::new("job-0").unwrap(),
        state: AnalysisState::Completed,
        message: None,
        created_at: "2026-01-02T10:00:00".to_string(),
    }]);
    let before = store.list();
    drop(store);

    let reopened = LifecycleStore::open(backend);
    assert_eq!(reopened.list(), before);
    assert_eq!(reopened.history().len(), 1);
    assert_eq!(reopened.completed().len(), 4);
    assert_eq!(reopened.failed().len(), 4);
}

#[test]
fn persistence_tests_layout_uses_camel_case_arrays() {
    let backend = Arc::new(MemoryKeyValueStore::new());
    let store = LifecycleStore::open(backend.clone());
    populate(&store, 1);

    let raw = backend
        .get(ANALYSES_KEY)
        .unwrap()
        .expect("records should be persisted");
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &parsed.as_array().expect("records are an array")[0];
    assert!(first.get("remoteId").is_some());
    assert!(first.get("createdAt").is_some());
    assert!(first.get("inputRef").is_some());
    assert_eq!(first["state"], "completed");
}

#[test]
fn persistence_tests_invalid_records_are_skipped_on_load() {
    let backend = Arc::new(MemoryKeyValueStore::new());
    backend
        .set(
            ANALYSES_KEY,
            &json!([
                {"id": "a", "state": "completed", "progress": 100,
                 "inputRef": {"uri": "/v.mp4"},
                 "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:01Z"},
                {"id": "b", "state": "pending", "progress": 0,
                 "inputRef": {"uri": "/v.mp4"},
                 "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z"},
                {"garbage": true}
            ])
            .to_string(),
        )
        .unwrap();
    backend.set(HISTORY_KEY, "not json").unwrap();

    let store = LifecycleStore::open(backend);
    let records = store.list();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.as_str(), "b");
    assert!(store.history().is_empty());
}

#[test]
fn persistence_tests_clear_drops_persisted_state() {
    let backend = Arc::new(MemoryKeyValueStore::new());
    let store = LifecycleStore::open(backend.clone());
    populate(&store, 3);
    store.clear();

    assert!(store.is_empty());
    assert!(backend.is_empty());
    assert!(LifecycleStore::open(backend).is_empty());
}
