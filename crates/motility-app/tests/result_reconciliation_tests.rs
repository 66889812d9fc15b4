//! Integration tests for terminal snapshot reconciliation.

mod common;

use std::sync::Arc;

use motility_client::ClientError;
use motility_core::{AnalysisState, FailureKind, RemoteState, StatusSnapshot};
use tokio::sync::Notify;

use common::{ScriptedClient, completed, manager_with, parameters, processing, video};

#[tokio::test(start_paused = true)]
async fn result_reconciliation_tests_completion_waits_for_result_fetch() {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(
        ScriptedClient::new()
            .with_statuses(vec![completed()])
            .with_result_gate(gate.clone()),
    );
    let manager = manager_with(client.clone(), 5);

    let id = manager.submit(video(), parameters()).await.unwrap();
    common::settle().await;

    assert_eq!(client.result_calls(), 1);
    let pending = manager.get(&id).unwrap();
    assert_eq!(pending.state, AnalysisState::Processing);
    assert!(pending.result.is_none());

    gate.notify_one();
    let record = common::wait_terminal(&manager, &id).await;
    assert_eq!(record.state, AnalysisState::Completed);
    assert_eq!(record.progress, 100);
}

#[tokio::test(start_paused = true)]
async fn result_reconciliation_tests_failed_result_fetch_fails_record() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_statuses(vec![processing(80), completed()])
            .with_result(Err(ClientError::Server {
                status_code: 500,
                detail: None,
            })),
    );
    let manager = manager_with(client, 5);

    let id = manager.submit(video(), parameters()).await.unwrap();
    let record = common::wait_terminal(&manager, &id).await;

    assert_eq!(record.state, AnalysisState::Failed);
    assert!(record.result.is_none());
    let cause = record.error.unwrap();
    assert_eq!(cause.kind, FailureKind::ResultFetchError);
    assert_eq!(cause.status_code, Some(500));
    assert_eq!(record.progress, 80);
}

#[tokio::test(start_paused = true)]
async fn result_reconciliation_tests_server_failure_is_analysis_failed() {
    let client = Arc::new(ScriptedClient::new().with_statuses(vec![
        processing(30),
        Ok(StatusSnapshot::new(
            RemoteState::Failed,
            30,
            Some("No sperm cells detected".to_string()),
        )),
    ]));
    let manager = manager_with(client.clone(), 5);

    let id = manager.submit(video(), parameters()).await.unwrap();
    let record = common::wait_terminal(&manager, &id).await;

    let cause = record.error.expect("cause recorded");
    assert_eq!(cause.kind, FailureKind::AnalysisFailed);
    assert_eq!(cause.message, "No sperm cells detected");
    assert_eq!(client.result_calls(), 0);
    assert!(!manager.is_polling(&id));
}
