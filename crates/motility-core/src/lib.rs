#![warn(missing_docs)]
//! # motility-core
//!
//! ## Purpose
//! Defines the pure data model shared by every `motility` crate: analysis
//! records, their lifecycle states, failure causes, status snapshots, and the
//! field-level patches that move a record through its lifecycle.
//!
//! ## Responsibilities
//! - Represent one tracked remote analysis as an [`AnalysisRecord`].
//! - Encode the legal lifecycle transitions in [`AnalysisState`].
//! - Merge [`RecordPatch`] values into records while enforcing the record
//!   invariants (terminal records are frozen, immutable fields stay put,
//!   `result`/`error` only in their terminal state).
//!
//! ## Data flow
//! The lifecycle manager builds a [`RecordPatch`] from each observed event
//! (submission outcome, [`StatusSnapshot`], result fetch) and hands it to the
//! store, which calls [`AnalysisRecord::apply`].
//!
//! ## Ownership and lifetimes
//! Records own all of their data so snapshots can be cloned out of the store
//! and handed to observers without borrowing the store's collection.
//!
//! ## Error model
//! Invariant violations are reported as [`CoreError`] values and leave the
//! record untouched.
//!
//! ## Example
//! ```rust
//! use chrono::Utc;
//! use motility_core::{AnalysisParameters, AnalysisRecord, AnalysisState, InputRef, RecordPatch};
//!
//! let mut record = AnalysisRecord::new(InputRef::new("file:///clip.mp4"), AnalysisParameters::new(), Utc::now());
//! record.apply(RecordPatch::submitting(), Utc::now()).unwrap();
//! assert_eq!(record.state, AnalysisState::Submitting);
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Locally generated primary key of an [`AnalysisRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Allocates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyIdentifier`] when `raw` is blank.
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(CoreError::EmptyIdentifier("record id"));
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job handle assigned by the remote analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wraps a service-issued identifier.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyIdentifier`] when `raw` is blank.
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(CoreError::EmptyIdentifier("remote id"));
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    /// Record created, nothing sent yet.
    Pending,
    /// Input media is being transferred to the service.
    Submitting,
    /// Service accepted the job and is working on it.
    Processing,
    /// Result payload fetched and attached.
    Completed,
    /// Unrecoverable failure or user cancellation.
    Failed,
}

impl AnalysisState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` when moving from `self` to `next` is legal.
    ///
    /// Staying in the same non-terminal state is legal (progress updates).
    pub fn can_transition_to(self, next: Self) -> bool {
        use AnalysisState::*;

        match (self, next) {
            (Completed | Failed, _) => false,
            (current, next) if current == next => true,
            (Pending, Submitting | Failed) => true,
            (Submitting, Processing | Failed) => true,
            (Processing, Completed | Failed) => true,
            _ => false,
        }
    }

    /// Lowercase label used in logs and persisted JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitting => "submitting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Job state as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    /// Queued or running on the service.
    Processing,
    /// Service finished the analysis; results are retrievable.
    Completed,
    /// Service gave up on the analysis.
    Failed,
}

impl RemoteState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Opaque reference to the input media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRef {
    /// Location of the media (local path or `file://` URI).
    pub uri: String,
    /// MIME type announced on upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// File name announced on upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl InputRef {
    /// MIME type used when the caller did not provide one.
    pub const DEFAULT_MIME_TYPE: &'static str = "video/mp4";
    /// File name used when the caller did not provide one.
    pub const DEFAULT_FILE_NAME: &'static str = "video.mp4";

    /// Creates a reference with default MIME type and file name.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            file_name: None,
        }
    }

    /// Sets the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// MIME type to send, falling back to [`Self::DEFAULT_MIME_TYPE`].
    pub fn effective_mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(Self::DEFAULT_MIME_TYPE)
    }

    /// File name to send, falling back to [`Self::DEFAULT_FILE_NAME`].
    pub fn effective_file_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(Self::DEFAULT_FILE_NAME)
    }
}

/// Caller-chosen analysis configuration, passed through unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisParameters(Map<String, Value>);

impl AnalysisParameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Adds or replaces one parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up one parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` when no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for AnalysisParameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Final payload returned by the service for a completed analysis.
///
/// Only the blocks the client reads are typed; everything else the service
/// sends (video info, tracks, statistics) is preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Aggregate measurements.
    #[serde(default)]
    pub summary: ResultSummary,
    /// Per-frame time series.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_series: Vec<TimeSeriesPoint>,
    /// Untyped remainder of the payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Summary block of a [`ResultPayload`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Total number of cells detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sperm: Option<u64>,
    /// Number of motile cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motile_sperm: Option<u64>,
    /// Share of motile cells in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motility_percentage: Option<f64>,
    /// Any other summary metric, keyed by the service's name.
    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

impl ResultSummary {
    /// Motility percentage, falling back to the service's averaged metric.
    pub fn motility(&self) -> Option<f64> {
        self.motility_percentage.or_else(|| {
            self.metrics
                .get("average_motility_percentage")
                .and_then(Value::as_f64)
        })
    }

    /// Total detected count, falling back to the service's detection metric.
    pub fn total(&self) -> Option<u64> {
        self.total_sperm.or_else(|| {
            self.metrics
                .get("total_sperm_detected")
                .and_then(Value::as_u64)
        })
    }
}

/// One sample of the per-frame time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Seconds since the start of the video.
    pub time: f64,
    /// Cells visible at this instant.
    #[serde(default)]
    pub sperm_count: u64,
    /// Motility percentage at this instant.
    #[serde(default)]
    pub motility: f64,
    /// Mean velocity at this instant.
    #[serde(default)]
    pub velocity: f64,
    /// Cell density at this instant.
    #[serde(default)]
    pub density: f64,
}

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// No response reached the client.
    TransportError,
    /// The service rejected or failed a request.
    ServerError,
    /// The service reported the analysis itself as failed.
    AnalysisFailed,
    /// The service reported completion but the result could not be retrieved.
    ResultFetchError,
    /// Status polling failed too many times in a row.
    PollExhausted,
    /// The user cancelled the analysis.
    UserCancelled,
}

/// Structured cause stored on a `Failed` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCause {
    /// Failure category.
    pub kind: FailureKind,
    /// Message suitable for direct display.
    pub message: String,
    /// HTTP status, when the service answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Raw detail for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureCause {
    /// Creates a cause with a display message.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            detail: None,
        }
    }

    /// Attaches an HTTP status code.
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attaches diagnostic detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Cause recorded when the user cancels.
    pub fn user_cancelled() -> Self {
        Self::new(FailureKind::UserCancelled, "Analysis cancelled")
    }

    /// Cause recorded when the service reports the analysis as failed.
    pub fn analysis_failed(server_message: Option<&str>) -> Self {
        let message = server_message
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or("Analysis failed");
        Self::new(FailureKind::AnalysisFailed, message)
    }

    /// Cause recorded when polling gives up.
    pub fn poll_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::new(
            FailureKind::PollExhausted,
            "Lost contact with the analysis server - please try again later",
        )
        .with_detail(format!(
            "{attempts} consecutive status checks failed; last error: {}",
            last_error.into()
        ))
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One status observation of a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Reported job state.
    pub state: RemoteState,
    /// Reported progress in percent (clamped to 100).
    pub progress: u8,
    /// Reported status line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Synthetic cause, set only for snapshots fabricated by the poller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
}

impl StatusSnapshot {
    /// Creates a snapshot reported by the service.
    pub fn new(state: RemoteState, progress: u8, message: Option<String>) -> Self {
        Self {
            state,
            progress: progress.min(100),
            message,
            cause: None,
        }
    }

    /// Synthetic `Failed` snapshot emitted when polling gives up.
    pub fn exhausted(attempts: u32, last_error: impl Into<String>, last_progress: u8) -> Self {
        let cause = FailureCause::poll_exhausted(attempts, last_error);
        Self {
            state: RemoteState::Failed,
            progress: last_progress.min(100),
            message: Some(cause.message.clone()),
            cause: Some(cause),
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// The unit tracked by the lifecycle store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// Primary key.
    pub id: RecordId,
    /// Service job handle; present once the service accepted the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    /// Lifecycle state.
    pub state: AnalysisState,
    /// Analysis progress in percent.
    pub progress: u8,
    /// Upload progress in percent.
    #[serde(default)]
    pub upload_progress: u8,
    /// Latest status line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Service estimate returned on submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    /// Caller-chosen analysis configuration.
    #[serde(default)]
    pub parameters: AnalysisParameters,
    /// Input media reference.
    pub input_ref: InputRef,
    /// Result payload, only when `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultPayload>,
    /// Failure cause, only when `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureCause>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the latest mutation.
    pub updated_at: DateTime<Utc>,
    /// Time the record reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    /// Creates a new `Pending` record with a fresh id.
    pub fn new(input_ref: InputRef, parameters: AnalysisParameters, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            remote_id: None,
            state: AnalysisState::Pending,
            progress: 0,
            upload_progress: 0,
            message: None,
            estimated_time: None,
            parameters,
            input_ref,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Returns `true` when the record reached `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Merges `patch` into the record.
    ///
    /// The patch is validated as a whole before any field changes, so a
    /// rejected patch leaves the record untouched. Progress values never move
    /// backwards and are clamped to 100. Reaching `Completed` forces progress
    /// to 100.
    ///
    /// # Errors
    /// - [`CoreError::TerminalRecord`] when the record is already terminal.
    /// - [`CoreError::IllegalTransition`] for a transition the lifecycle forbids.
    /// - [`CoreError::ImmutableField`] when the patch rewrites `remoteId`.
    /// - [`CoreError::InvariantViolation`] when `result`/`error`/`remoteId`
    ///   would not match the target state.
    pub fn apply(&mut self, patch: RecordPatch, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::TerminalRecord {
                id: self.id.clone(),
                state: self.state,
            });
        }

        let target = patch.state.unwrap_or(self.state);
        if !self.state.can_transition_to(target) {
            return Err(CoreError::IllegalTransition {
                from: self.state,
                to: target,
            });
        }

        if let (Some(current), Some(incoming)) = (&self.remote_id, &patch.remote_id)
            && current != incoming
        {
            return Err(CoreError::ImmutableField("remoteId"));
        }

        let has_remote_id = self.remote_id.is_some() || patch.remote_id.is_some();
        if target == AnalysisState::Processing && !has_remote_id {
            return Err(CoreError::InvariantViolation(
                "processing record requires a remote id".to_string(),
            ));
        }
        if patch.remote_id.is_some() && target != AnalysisState::Processing {
            return Err(CoreError::InvariantViolation(
                "remote id may only be attached when entering processing".to_string(),
            ));
        }

        if (target == AnalysisState::Completed) != patch.result.is_some() {
            return Err(CoreError::InvariantViolation(
                "result must be attached exactly when completing".to_string(),
            ));
        }
        if (target == AnalysisState::Failed) != patch.error.is_some() {
            return Err(CoreError::InvariantViolation(
                "error must be attached exactly when failing".to_string(),
            ));
        }

        if let Some(remote_id) = patch.remote_id {
            self.remote_id = Some(remote_id);
        }
        if let Some(progress) = patch.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(upload_progress) = patch.upload_progress {
            self.upload_progress = self.upload_progress.max(upload_progress.min(100));
        }
        if let Some(message) = patch.message {
            self.message = Some(message);
        }
        if let Some(estimated_time) = patch.estimated_time {
            self.estimated_time = Some(estimated_time);
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
            self.progress = 100;
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }

        self.state = target;
        self.touch(now);
        if target.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }

        Ok(())
    }

    /// Checks the cross-field invariants of a record loaded from storage.
    ///
    /// # Errors
    /// Returns [`CoreError::InvariantViolation`] naming the first broken rule.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.progress > 100 || self.upload_progress > 100 {
            return Err(CoreError::InvariantViolation(
                "progress exceeds 100".to_string(),
            ));
        }
        if (self.state == AnalysisState::Completed) != self.result.is_some() {
            return Err(CoreError::InvariantViolation(
                "result present outside completed state".to_string(),
            ));
        }
        if (self.state == AnalysisState::Failed) != self.error.is_some() {
            return Err(CoreError::InvariantViolation(
                "error present outside failed state".to_string(),
            ));
        }
        let needs_remote_id = matches!(
            self.state,
            AnalysisState::Processing | AnalysisState::Completed
        );
        if needs_remote_id && self.remote_id.is_none() {
            return Err(CoreError::InvariantViolation(
                "remote id missing after submission".to_string(),
            ));
        }
        if matches!(self.state, AnalysisState::Pending | AnalysisState::Submitting)
            && self.remote_id.is_some()
        {
            return Err(CoreError::InvariantViolation(
                "remote id present before submission finished".to_string(),
            ));
        }
        if self.updated_at < self.created_at {
            return Err(CoreError::InvariantViolation(
                "updatedAt precedes createdAt".to_string(),
            ));
        }
        Ok(())
    }

    // `updated_at` must strictly advance even when the clock does not.
    fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = if now > self.updated_at { now } else { floor };
    }
}

/// Field-level partial update for an [`AnalysisRecord`].
///
/// `None` fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    /// New lifecycle state.
    pub state: Option<AnalysisState>,
    /// Service job handle to attach.
    pub remote_id: Option<RemoteId>,
    /// Analysis progress.
    pub progress: Option<u8>,
    /// Upload progress.
    pub upload_progress: Option<u8>,
    /// Status line.
    pub message: Option<String>,
    /// Service estimate.
    pub estimated_time: Option<String>,
    /// Result payload to attach.
    pub result: Option<ResultPayload>,
    /// Failure cause to attach.
    pub error: Option<FailureCause>,
}

impl RecordPatch {
    /// Moves a `Pending` record into `Submitting`.
    pub fn submitting() -> Self {
        Self {
            state: Some(AnalysisState::Submitting),
            message: Some("Uploading video...".to_string()),
            ..Self::default()
        }
    }

    /// Reports upload progress while `Submitting`.
    pub fn upload_progress(percent: u8) -> Self {
        Self {
            upload_progress: Some(percent),
            ..Self::default()
        }
    }

    /// Moves a `Submitting` record into `Processing` with its job handle.
    pub fn processing(
        remote_id: RemoteId,
        message: Option<String>,
        estimated_time: Option<String>,
    ) -> Self {
        Self {
            state: Some(AnalysisState::Processing),
            remote_id: Some(remote_id),
            upload_progress: Some(100),
            message,
            estimated_time,
            ..Self::default()
        }
    }

    /// Applies a non-terminal status snapshot.
    pub fn progress(progress: u8, message: Option<String>) -> Self {
        Self {
            progress: Some(progress),
            message,
            ..Self::default()
        }
    }

    /// Completes the record with its result payload.
    pub fn completed(result: ResultPayload) -> Self {
        Self {
            state: Some(AnalysisState::Completed),
            message: Some("Analysis completed successfully".to_string()),
            result: Some(result),
            ..Self::default()
        }
    }

    /// Fails the record with `cause`.
    pub fn failed(cause: FailureCause) -> Self {
        Self {
            state: Some(AnalysisState::Failed),
            message: Some(cause.message.clone()),
            error: Some(cause),
            ..Self::default()
        }
    }
}

/// Server-side history item cached by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Entry key; equals the remote id.
    pub id: String,
    /// Service job handle.
    pub remote_id: RemoteId,
    /// Reported state mapped onto the local lifecycle.
    pub state: AnalysisState,
    /// Reported status line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Creation time as reported by the service (free-form).
    pub created_at: String,
}

/// Error type for data-model validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier was blank.
    #[error("{0} is empty")]
    EmptyIdentifier(&'static str),
    /// The record is terminal and frozen.
    #[error("record {id} is {state} and cannot change")]
    TerminalRecord {
        /// Record id.
        id: RecordId,
        /// Terminal state.
        state: AnalysisState,
    },
    /// The lifecycle does not allow this transition.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        /// Current state.
        from: AnalysisState,
        /// Requested state.
        to: AnalysisState,
    },
    /// The patch tried to rewrite a write-once field.
    #[error("field {0} is immutable once set")]
    ImmutableField(&'static str),
    /// The record would break a cross-field invariant.
    #[error("record invariant violation: {0}")]
    InvariantViolation(String),
    /// JSON encoding/decoding error.
    #[error("record codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
