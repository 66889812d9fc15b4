//! Integration tests for auxiliary service operations.

mod common;

use std::sync::Arc;

use motility_app::LifecycleError;
use motility_client::ExportFormat;
use motility_core::AnalysisState;

use common::{ScriptedClient, manager_with, parameters, video};

#[tokio::test(start_paused = true)]
async fn server_operations_tests_history_is_cached_in_store() {
    let manager = manager_with(Arc::new(ScriptedClient::new()), 5);

    assert_eq!(manager.refresh_history().await.unwrap(), 1);
    let history = manager.store().history();
    assert_eq!(history[0].remote_id.as_str(), "job-1");
    assert_eq!(history[0].state, AnalysisState::Completed);
}

#[tokio::test(start_paused = true)]
async fn server_operations_tests_download_requires_completed_record() {
    let client = Arc::new(ScriptedClient::new().with_statuses(vec![common::completed()]));
    let manager = manager_with(client, 5);

    let id = manager.submit(video(), parameters()).await.unwrap();
    assert!(matches!(
        manager.download_results(&id, ExportFormat::Csv).await,
        Err(LifecycleError::InvalidState { .. })
    ));

    common::wait_terminal(&manager, &id).await;
    let bytes = manager
        .download_results(&id, ExportFormat::Csv)
        .await
        .expect("download should succeed");
    assert_eq!(bytes, b"job-1.csv");
}

#[tokio::test(start_paused = true)]
async fn server_operations_tests_status_and_statistics() {
    let manager = manager_with(Arc::new(ScriptedClient::new()), 5);

    let report = manager.check_server_status().await;
    assert!(report.success);
    assert_eq!(report.message, "Connection successful");

    let statistics = manager.load_statistics().await.unwrap();
    assert_eq!(statistics["total_analyses"], 3);
}
