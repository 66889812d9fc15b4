//! Integration tests for restart recovery and shutdown.

mod common;

use std::sync::Arc;

use motility_core::{AnalysisState, FailureKind, RecordPatch, RemoteId};
use motility_store::{JsonFileKeyValueStore, LifecycleStore};

use common::{POLL_INTERVAL, ScriptedClient, manager_over, parameters, processing, video};

#[tokio::test(start_paused = true)]
async fn restore_tests_init_resumes_processing_and_fails_interrupted_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(JsonFileKeyValueStore::open(dir.path()).unwrap());

    let (processing_id, pending_id, submitting_id) = {
        let store = LifecycleStore::open(backend.clone());
        let processing_record = store.create(video(), parameters());
        store
            .update(&processing_record.id, RecordPatch::submitting())
            .unwrap();
        store
            .update(
                &processing_record.id,
                RecordPatch::processing(RemoteId::new("job-7").unwrap(), None, None),
            )
            .unwrap();
        let pending = store.create(video(), parameters());
        let submitting = store.create(video(), parameters());
        store.update(&submitting.id, RecordPatch::submitting()).unwrap();
        (processing_record.id, pending.id, submitting.id)
    };

    let store = Arc::new(LifecycleStore::open(backend));
    let client = Arc::new(ScriptedClient::new().with_statuses(vec![common::completed()]));
    let manager = manager_over(store, client, 5);

    let report = manager.init();
    assert_eq!(report.resumed, vec![processing_id.clone()]);
    assert_eq!(report.interrupted.len(), 2);

    for id in [&pending_id, &submitting_id] {
        let record = manager.get(id).unwrap();
        assert_eq!(record.state, AnalysisState::Failed);
        assert_eq!(
            record.error.map(|cause| cause.kind),
            Some(FailureKind::TransportError)
        );
    }

    let resumed = common::wait_terminal(&manager, &processing_id).await;
    assert_eq!(resumed.state, AnalysisState::Completed);
}

#[tokio::test(start_paused = true)]
async fn restore_tests_init_twice_starts_one_loop() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(LifecycleStore::in_memory());
    let manager = manager_over(store, client.clone(), 5);
    let id = manager.submit(video(), parameters()).await.unwrap();

    manager.init();
    manager.init();
    tokio::time::sleep(POLL_INTERVAL / 2).await;

    assert_eq!(client.status_calls(), 1);
    manager.dispose();
    assert!(!manager.is_polling(&id));
}

#[tokio::test(start_paused = true)]
async fn restore_tests_dispose_stops_polling_without_changing_state() {
    let client = Arc::new(ScriptedClient::new().with_statuses(vec![processing(25)]));
    let store = Arc::new(LifecycleStore::in_memory());
    let manager = manager_over(store, client.clone(), 5);

    let id = manager.submit(video(), parameters()).await.unwrap();
    common::settle().await;
    manager.dispose();

    let calls = client.status_calls();
    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert_eq!(client.status_calls(), calls);

    let record = manager.get(&id).unwrap();
    assert_eq!(record.state, AnalysisState::Processing);
    assert_eq!(record.progress, 25);
}
