//! Shared fixtures for lifecycle integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use motility_app::{LifecycleManager, ManagerConfig};
use motility_client::{
    ClientError, ExportFormat, HealthReport, RemoteJobClient, SubmitReceipt, UploadProgress,
};
use motility_core::{
    AnalysisParameters, AnalysisRecord, AnalysisState, HistoryEntry, InputRef, RecordId,
    RemoteId, RemoteState, ResultPayload, StatusSnapshot,
};
use motility_poller::PollConfig;
use motility_store::LifecycleStore;
use serde_json::{Value, json};
use tokio::sync::Notify;

/// Scripted in-memory service.
///
/// Scripts are consumed front to back; an empty status script keeps
/// answering `processing` without changing progress.
#[derive(Default)]
pub struct ScriptedClient {
    pub submits: Mutex<VecDeque<Result<SubmitReceipt, ClientError>>>,
    pub statuses: Mutex<VecDeque<Result<StatusSnapshot, ClientError>>>,
    pub results: Mutex<VecDeque<Result<ResultPayload, ClientError>>>,
    pub submit_gate: Option<Arc<Notify>>,
    pub result_gate: Option<Arc<Notify>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub cancelled: Mutex<Vec<RemoteId>>,
    pub deleted: Mutex<Vec<RemoteId>>,
    pub parameters_seen: Mutex<Vec<AnalysisParameters>>,
}

#[allow(dead_code)]
impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit(self, outcome: Result<SubmitReceipt, ClientError>) -> Self {
        self.submits.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_statuses(self, statuses: Vec<Result<StatusSnapshot, ClientError>>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn with_result(self, outcome: Result<ResultPayload, ClientError>) -> Self {
        self.results.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_submit_gate(mut self, gate: Arc<Notify>) -> Self {
        self.submit_gate = Some(gate);
        self
    }

    pub fn with_result_gate(mut self, gate: Arc<Notify>) -> Self {
        self.result_gate = Some(gate);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> Vec<RemoteId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<RemoteId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteJobClient for ScriptedClient {
    async fn submit(
        &self,
        _input: &InputRef,
        parameters: &AnalysisParameters,
        progress: Option<UploadProgress>,
    ) -> Result<SubmitReceipt, ClientError> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.parameters_seen.lock().unwrap().push(parameters.clone());
        if let Some(progress) = &progress {
            progress(50);
        }
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }

        let outcome = self
            .submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(receipt(&format!("job-{call}"))));
        if outcome.is_ok()
            && let Some(progress) = &progress
        {
            progress(100);
        }
        outcome
    }

    async fn fetch_status(&self, _remote_id: &RemoteId) -> Result<StatusSnapshot, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatusSnapshot::new(RemoteState::Processing, 0, None)))
    }

    async fn fetch_result(&self, _remote_id: &RemoteId) -> Result<ResultPayload, ClientError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.result_gate {
            gate.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(motility_result()))
    }

    async fn download(
        &self,
        remote_id: &RemoteId,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        Ok(format!("{remote_id}.{}", format.as_str()).into_bytes())
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        Ok(vec![HistoryEntry {
            id: "job-1".to_string(),
            remote_id: RemoteId::new("job-1").unwrap(),
            state: AnalysisState::Completed,
            message: Some("Analysis completed successfully".to_string()),
            created_at: "2026-01-02T10:00:00".to_string(),
        }])
    }

    async fn delete(&self, remote_id: &RemoteId) -> Result<(), ClientError> {
        self.deleted.lock().unwrap().push(remote_id.clone());
        Ok(())
    }

    async fn cancel(&self, remote_id: &RemoteId) -> Result<(), ClientError> {
        self.cancelled.lock().unwrap().push(remote_id.clone());
        Err(ClientError::Server {
            status_code: 404,
            detail: Some("Analysis not found".to_string()),
        })
    }

    async fn statistics(&self) -> Result<Value, ClientError> {
        Ok(json!({"total_analyses": 3, "completed_analyses": 2}))
    }

    async fn health(&self) -> Result<HealthReport, ClientError> {
        Ok(HealthReport {
            status: "healthy".to_string(),
            timestamp: None,
            version: Some("1.0.0".to_string()),
        })
    }
}

/// Poll interval used by the fixtures.
#[allow(dead_code)]
pub const POLL_INTERVAL: Duration = Duration::from_millis(2_000);

#[allow(dead_code)]
pub fn receipt(remote_id: &str) -> SubmitReceipt {
    SubmitReceipt {
        remote_id: RemoteId::new(remote_id).expect("fixture remote id"),
        message: Some("Video uploaded successfully".to_string()),
        estimated_time: Some("2-5 minutes".to_string()),
    }
}

#[allow(dead_code)]
pub fn processing(progress: u8) -> Result<StatusSnapshot, ClientError> {
    Ok(StatusSnapshot::new(
        RemoteState::Processing,
        progress,
        Some(format!("Processing frames ({progress}%)")),
    ))
}

#[allow(dead_code)]
pub fn completed() -> Result<StatusSnapshot, ClientError> {
    Ok(StatusSnapshot::new(RemoteState::Completed, 100, None))
}

#[allow(dead_code)]
pub fn transport_error() -> Result<StatusSnapshot, ClientError> {
    Err(ClientError::Transport("connection reset by peer".to_string()))
}

/// Result payload of the reference scenario.
#[allow(dead_code)]
pub fn motility_result() -> ResultPayload {
    serde_json::from_value(json!({
        "summary": {"total_sperm": 120, "motile_sperm": 80, "motility_percentage": 66.7}
    }))
    .expect("result fixture should parse")
}

#[allow(dead_code)]
pub fn video() -> InputRef {
    InputRef::new("/videos/sample.mp4").with_mime_type("video/mp4")
}

#[allow(dead_code)]
pub fn parameters() -> AnalysisParameters {
    AnalysisParameters::new().with("confidence_threshold", 0.5)
}

/// Builds a manager over an in-memory store.
#[allow(dead_code)]
pub fn manager_with(client: Arc<ScriptedClient>, retry_ceiling: u32) -> LifecycleManager {
    manager_over(Arc::new(LifecycleStore::in_memory()), client, retry_ceiling)
}

#[allow(dead_code)]
pub fn manager_over(
    store: Arc<LifecycleStore>,
    client: Arc<ScriptedClient>,
    retry_ceiling: u32,
) -> LifecycleManager {
    let config = ManagerConfig {
        poll: PollConfig {
            interval: POLL_INTERVAL,
            retry_ceiling,
            error_jitter: Duration::ZERO,
        },
        delete_remote: true,
    };
    LifecycleManager::new(store, client, config)
}

/// Advances (paused) time until `id` is terminal.
#[allow(dead_code)]
pub async fn wait_terminal(manager: &LifecycleManager, id: &RecordId) -> AnalysisRecord {
    for _ in 0..1_000 {
        let record = manager.get(id).expect("record should exist");
        if record.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("record {id} never reached a terminal state");
}

/// Lets spawned tasks run without advancing past the next poll tick.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
