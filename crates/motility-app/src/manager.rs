//! Lifecycle manager: drives records from submission to a terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use motility_client::{
    ClientError, ConnectionReport, ExportFormat, RemoteJobClient, UploadProgress,
};
use motility_core::{
    AnalysisParameters, AnalysisRecord, AnalysisState, FailureCause, FailureKind, InputRef,
    RecordId, RecordPatch, RemoteId, RemoteState, StatusSnapshot,
};
use motility_poller::{PollHandle, PollOptions, Poller, SnapshotSink};
use motility_store::{LifecycleStore, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{LifecycleError, ManagerConfig};

/// Records restored by [`LifecycleManager::init`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Records whose poll loop was restarted.
    pub resumed: Vec<RecordId>,
    /// Records failed because their upload was interrupted.
    pub interrupted: Vec<RecordId>,
}

/// Coordinates the client, the poller and the store.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<LifecycleStore>,
    client: Arc<dyn RemoteJobClient>,
    poller: Poller,
    config: ManagerConfig,
    active: Mutex<HashMap<RecordId, PollHandle>>,
}

impl LifecycleManager {
    /// Creates a manager over a shared store and client.
    pub fn new(
        store: Arc<LifecycleStore>,
        client: Arc<dyn RemoteJobClient>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                poller: Poller::new(Arc::clone(&client)),
                store,
                client,
                config,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Shared store; read records and subscribe through it.
    pub fn store(&self) -> &Arc<LifecycleStore> {
        &self.inner.store
    }

    /// Returns a copy of the record `id`.
    pub fn get(&self, id: &RecordId) -> Option<AnalysisRecord> {
        self.inner.store.get(id)
    }

    /// All records, most recently created first.
    pub fn list(&self) -> Vec<AnalysisRecord> {
        self.inner.store.list()
    }

    /// Returns `true` while a poll loop runs for `id`.
    pub fn is_polling(&self, id: &RecordId) -> bool {
        self.inner
            .active
            .lock()
            .get(id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Restores tracking after a restart.
    ///
    /// `Processing` records get a fresh poll loop. `Pending` and `Submitting`
    /// records lost their upload with the previous process and are failed.
    pub fn init(&self) -> InitReport {
        let mut report = InitReport::default();
        for record in self.inner.store.in_progress() {
            match (record.state, record.remote_id.clone()) {
                (AnalysisState::Processing, Some(remote_id)) => {
                    self.inner.start_tracking(&record.id, remote_id);
                    report.resumed.push(record.id);
                }
                _ => {
                    let cause = FailureCause::new(
                        FailureKind::TransportError,
                        "Upload was interrupted - please submit the video again",
                    )
                    .with_detail(format!("record left in {} at shutdown", record.state));
                    if self.inner.fail(&record.id, cause) {
                        report.interrupted.push(record.id);
                    }
                }
            }
        }
        info!(
            resumed = report.resumed.len(),
            interrupted = report.interrupted.len(),
            "lifecycle manager initialized"
        );
        report
    }

    /// Stops every poll loop without touching record state.
    pub fn dispose(&self) {
        let handles: Vec<PollHandle> = self.inner.active.lock().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.cancel();
        }
        info!(stopped = handles.len(), "lifecycle manager disposed");
    }

    /// Submits `input_ref` for analysis and waits for the upload to finish.
    ///
    /// The record is visible in the store as soon as this is called. On
    /// success the record is `Processing` and polled in the background.
    ///
    /// # Errors
    /// - [`LifecycleError::Submission`] when the service rejected or never
    ///   received the upload; the record is `Failed`.
    /// - [`LifecycleError::Cancelled`] when the record was cancelled before
    ///   the upload completed.
    pub async fn submit(
        &self,
        input_ref: InputRef,
        parameters: AnalysisParameters,
    ) -> Result<RecordId, LifecycleError> {
        let record = self.inner.store.create(input_ref, parameters);
        Arc::clone(&self.inner).run_submission(record).await
    }

    /// Creates the record and runs the submission in a background task.
    ///
    /// Returns the new record id at once, plus a handle resolving to the
    /// same outcome [`LifecycleManager::submit`] would return.
    pub fn spawn_submit(
        &self,
        input_ref: InputRef,
        parameters: AnalysisParameters,
    ) -> (RecordId, JoinHandle<Result<RecordId, LifecycleError>>) {
        let record = self.inner.store.create(input_ref, parameters);
        let id = record.id.clone();
        let inner = Arc::clone(&self.inner);
        (id, tokio::spawn(inner.run_submission(record)))
    }

    /// Submits a failed record's input again as a new record.
    ///
    /// # Errors
    /// - [`LifecycleError::NotFound`] for an unknown id.
    /// - [`LifecycleError::InvalidState`] unless the record is `Failed`.
    /// - Any error of [`LifecycleManager::submit`] for the new record.
    pub async fn retry(&self, id: &RecordId) -> Result<RecordId, LifecycleError> {
        let record = self
            .inner
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        if record.state != AnalysisState::Failed {
            return Err(LifecycleError::InvalidState {
                id: id.clone(),
                state: record.state,
                action: "retry",
            });
        }
        info!(record_id = %id, "retrying failed analysis as a new record");
        self.submit(record.input_ref, record.parameters).await
    }

    /// Cancels a non-terminal record.
    ///
    /// Stops its poll loop, marks it `Failed` with `UserCancelled` and asks
    /// the service to drop the job. Cancelling a terminal record does nothing.
    ///
    /// # Errors
    /// Returns [`LifecycleError::NotFound`] for an unknown id.
    pub async fn cancel(&self, id: &RecordId) -> Result<(), LifecycleError> {
        let Some(record) = self.inner.store.get(id) else {
            return Err(LifecycleError::NotFound(id.clone()));
        };
        if record.is_terminal() {
            debug!(record_id = %id, state = %record.state, "cancel ignored for terminal record");
            return Ok(());
        }

        if let Some(cancelled) = self.inner.stop_locally(id)
            && let Some(remote_id) = cancelled.remote_id
        {
            self.inner.cancel_remote(id, &remote_id).await;
        }
        Ok(())
    }

    /// Deletes a record, cancelling any active work first.
    ///
    /// Deleting an absent record does nothing. With remote deletion disabled
    /// an active job is cancelled on the server instead.
    pub async fn delete(&self, id: &RecordId) {
        let Some(record) = self.inner.store.get(id) else {
            debug!(record_id = %id, "delete ignored for unknown record");
            return;
        };

        let was_active = !record.is_terminal();
        let remote_id = if was_active {
            self.inner
                .stop_locally(id)
                .and_then(|record| record.remote_id)
                .or(record.remote_id)
        } else {
            record.remote_id
        };

        if let Some(remote_id) = remote_id {
            if self.inner.config.delete_remote {
                if let Err(error) = self.inner.client.delete(&remote_id).await {
                    warn!(record_id = %id, remote_id = %remote_id, error = %error, "remote delete failed");
                }
            } else if was_active {
                self.inner.cancel_remote(id, &remote_id).await;
            }
        }

        self.inner.store.remove(id);
    }

    /// Drops every local record and the history cache.
    pub fn clear_all(&self) {
        self.dispose();
        self.inner.store.clear();
    }

    /// Probes the service.
    pub async fn check_server_status(&self) -> ConnectionReport {
        let report = self.inner.client.test_connection().await;
        info!(
            success = report.success,
            latency_ms = report.latency.map(|latency| latency.as_millis() as u64),
            "server status checked"
        );
        report
    }

    /// Reloads the server history into the store.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Remote`] when the service call fails; the
    /// cached history is kept.
    pub async fn refresh_history(&self) -> Result<usize, LifecycleError> {
        let entries = self.inner.client.history().await?;
        let count = entries.len();
        self.inner.store.replace_history(entries);
        Ok(count)
    }

    /// Reads aggregate statistics from the service.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Remote`] when the service call fails.
    pub async fn load_statistics(&self) -> Result<Value, LifecycleError> {
        Ok(self.inner.client.statistics().await?)
    }

    /// Downloads an export of a completed record's results.
    ///
    /// # Errors
    /// - [`LifecycleError::NotFound`] for an unknown id.
    /// - [`LifecycleError::InvalidState`] unless the record is `Completed`.
    /// - [`LifecycleError::Remote`] when the download fails.
    pub async fn download_results(
        &self,
        id: &RecordId,
        format: ExportFormat,
    ) -> Result<Vec<u8>, LifecycleError> {
        let record = self
            .inner
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        let (AnalysisState::Completed, Some(remote_id)) = (record.state, record.remote_id) else {
            return Err(LifecycleError::InvalidState {
                id: id.clone(),
                state: record.state,
                action: "download",
            });
        };
        Ok(self.inner.client.download(&remote_id, format).await?)
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.inner.config)
            .field("active_polls", &self.inner.active.lock().len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn run_submission(self: Arc<Self>, record: AnalysisRecord) -> Result<RecordId, LifecycleError> {
        let id = record.id;
        if !matches!(self.store.update(&id, RecordPatch::submitting()), Ok(Some(_))) {
            return Err(LifecycleError::Cancelled(id));
        }
        info!(record_id = %id, "uploading analysis input");

        let submitted = self
            .client
            .submit(
                &record.input_ref,
                &record.parameters,
                Some(self.upload_progress_sink(&id)),
            )
            .await;

        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!(
                    record_id = %id,
                    status_code = error.status_code(),
                    error = %error,
                    "analysis submission failed"
                );
                if !self.fail(&id, error.to_failure()) {
                    return Err(LifecycleError::Cancelled(id));
                }
                return Err(LifecycleError::Submission { id, source: error });
            }
        };

        let patch = RecordPatch::processing(
            receipt.remote_id.clone(),
            receipt.message.clone(),
            receipt.estimated_time.clone(),
        );
        match self.store.update(&id, patch) {
            Ok(Some(_)) => {
                info!(record_id = %id, remote_id = %receipt.remote_id, "analysis accepted by server");
                self.start_tracking(&id, receipt.remote_id);
                Ok(id)
            }
            Ok(None) | Err(StoreError::Rejected { .. }) => {
                // Cancelled or deleted while the upload was in flight.
                self.cancel_remote(&id, &receipt.remote_id).await;
                Err(LifecycleError::Cancelled(id))
            }
        }
    }

    fn upload_progress_sink(self: &Arc<Self>, id: &RecordId) -> UploadProgress {
        let store = Arc::clone(&self.store);
        let id = id.clone();
        Arc::new(move |percent| {
            let active = store.get(&id).is_some_and(|record| !record.is_terminal());
            if active {
                let _ = store.update(&id, RecordPatch::upload_progress(percent));
            }
        })
    }

    /// Starts the poll loop for `id` unless one already runs or the record
    /// is no longer active.
    fn start_tracking(self: &Arc<Self>, id: &RecordId, remote_id: RemoteId) {
        let mut active = self.active.lock();
        if active.get(id).is_some_and(|handle| !handle.is_finished()) {
            debug!(record_id = %id, "poll loop already running");
            return;
        }
        if !self.store.get(id).is_some_and(|record| !record.is_terminal()) {
            return;
        }

        let sink = Arc::new(RecordSink {
            inner: Arc::clone(self),
            record_id: id.clone(),
            remote_id: remote_id.clone(),
        });
        let handle = self
            .poller
            .start(remote_id, sink, PollOptions::new(self.config.poll));
        active.insert(id.clone(), handle);
    }

    fn stop_tracking(&self, id: &RecordId) {
        if let Some(handle) = self.active.lock().remove(id) {
            handle.cancel();
        }
    }

    /// Stops polling and marks the record cancelled. Returns the cancelled
    /// record, or `None` when it had already ended.
    fn stop_locally(&self, id: &RecordId) -> Option<AnalysisRecord> {
        self.stop_tracking(id);
        let cancelled = match self.store.update(id, RecordPatch::failed(FailureCause::user_cancelled())) {
            Ok(record) => record,
            Err(error) => {
                debug!(record_id = %id, error = %error, "record ended before cancellation");
                None
            }
        };
        // A loop may have started between the first stop and the update.
        self.stop_tracking(id);
        if cancelled.is_some() {
            info!(record_id = %id, "analysis cancelled");
        }
        cancelled
    }

    async fn cancel_remote(&self, id: &RecordId, remote_id: &RemoteId) {
        if let Err(error) = self.client.cancel(remote_id).await {
            warn!(record_id = %id, remote_id = %remote_id, error = %error, "remote cancel failed");
        }
    }

    /// Marks `id` failed. Returns `false` when the record already ended.
    fn fail(&self, id: &RecordId, cause: FailureCause) -> bool {
        let kind = cause.kind;
        match self.store.update(id, RecordPatch::failed(cause)) {
            Ok(Some(_)) => {
                info!(record_id = %id, kind = ?kind, "analysis failed");
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    async fn reconcile(&self, id: &RecordId, remote_id: &RemoteId, snapshot: StatusSnapshot) {
        match snapshot.state {
            RemoteState::Processing => {
                let _ = self
                    .store
                    .update(id, RecordPatch::progress(snapshot.progress, snapshot.message));
            }
            RemoteState::Completed => {
                if !self.store.get(id).is_some_and(|record| !record.is_terminal()) {
                    return;
                }
                match self.client.fetch_result(remote_id).await {
                    Ok(payload) => {
                        if let Ok(Some(_)) = self.store.update(id, RecordPatch::completed(payload)) {
                            info!(record_id = %id, remote_id = %remote_id, "analysis completed");
                        }
                    }
                    Err(error) => {
                        warn!(record_id = %id, remote_id = %remote_id, error = %error, "result fetch failed");
                        self.fail(id, result_fetch_failure(&error));
                    }
                }
            }
            RemoteState::Failed => {
                let cause = snapshot
                    .cause
                    .unwrap_or_else(|| FailureCause::analysis_failed(snapshot.message.as_deref()));
                self.fail(id, cause);
            }
        }

        if snapshot.state.is_terminal() {
            self.active.lock().remove(id);
        }
    }
}

fn result_fetch_failure(error: &ClientError) -> FailureCause {
    let mut cause = FailureCause::new(
        FailureKind::ResultFetchError,
        "Analysis finished but its results could not be retrieved",
    )
    .with_detail(error.to_string());
    cause.status_code = error.status_code();
    cause
}

struct RecordSink {
    inner: Arc<Inner>,
    record_id: RecordId,
    remote_id: RemoteId,
}

#[async_trait]
impl SnapshotSink for RecordSink {
    async fn on_snapshot(&self, snapshot: StatusSnapshot) {
        self.inner
            .reconcile(&self.record_id, &self.remote_id, snapshot)
            .await;
    }
}
