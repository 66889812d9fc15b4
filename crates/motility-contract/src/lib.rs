#![warn(missing_docs)]
//! # motility-contract
//!
//! ## Purpose
//! Defines the JSON contract of the remote analysis service and the mapping
//! from wire shapes into `motility-core` types.
//!
//! ## Responsibilities
//! - Parse submit, status, result, history, and health responses.
//! - Map service status strings onto [`RemoteState`] (`pending` is treated as
//!   `processing`).
//! - Extract the human-readable `detail` from error bodies.
//!
//! ## Data flow
//! Raw response bytes -> `parse_*` -> owned contract structs -> `into_*`
//! conversions -> core types consumed by the client and lifecycle manager.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned so they outlive the transient network buffers.
//!
//! ## Error model
//! Invalid JSON or blank mandatory fields return [`AnalysisContractError`].

use motility_core::{
    AnalysisState, HistoryEntry, RemoteId, RemoteState, ResultPayload, StatusSnapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Endpoint path for job submission.
pub const SUBMIT_PATH: &str = "analyze";
/// Endpoint prefix for status polling.
pub const STATUS_PATH: &str = "status";
/// Endpoint prefix for result retrieval.
pub const RESULTS_PATH: &str = "results";
/// Endpoint prefix for result export.
pub const DOWNLOAD_PATH: &str = "download";
/// Endpoint prefix for analysis deletion.
pub const DELETE_PATH: &str = "delete";
/// Endpoint path for server-side history.
pub const HISTORY_PATH: &str = "history";
/// Endpoint path for aggregate statistics.
pub const STATISTICS_PATH: &str = "statistics";
/// Endpoint path for health checks.
pub const HEALTH_PATH: &str = "health";

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";
/// Multipart field carrying the JSON parameters.
pub const PARAMETERS_FIELD: &str = "parameters";

/// Job status string used by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    /// Queued.
    Pending,
    /// Running.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
}

impl From<WireStatus> for RemoteState {
    fn from(status: WireStatus) -> Self {
        match status {
            WireStatus::Pending | WireStatus::Processing => RemoteState::Processing,
            WireStatus::Completed => RemoteState::Completed,
            WireStatus::Failed => RemoteState::Failed,
        }
    }
}

impl From<WireStatus> for AnalysisState {
    fn from(status: WireStatus) -> Self {
        match status {
            WireStatus::Pending => AnalysisState::Pending,
            WireStatus::Processing => AnalysisState::Processing,
            WireStatus::Completed => AnalysisState::Completed,
            WireStatus::Failed => AnalysisState::Failed,
        }
    }
}

/// Response body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Service job handle.
    pub analysis_id: String,
    /// Start status reported by the service.
    #[serde(default)]
    pub status: Option<String>,
    /// Start message.
    #[serde(default)]
    pub message: Option<String>,
    /// Estimated processing time.
    #[serde(default)]
    pub estimated_time: Option<String>,
}

/// Accepted submission, mapped onto core types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Service job handle.
    pub remote_id: RemoteId,
    /// Start message.
    pub message: Option<String>,
    /// Estimated processing time.
    pub estimated_time: Option<String>,
}

impl SubmitResponse {
    /// Converts the response into a [`SubmitReceipt`].
    ///
    /// # Errors
    /// Returns [`AnalysisContractError::InvalidContract`] when `analysis_id`
    /// is blank.
    pub fn into_receipt(self) -> Result<SubmitReceipt, AnalysisContractError> {
        let remote_id = RemoteId::new(self.analysis_id)
            .map_err(|_| AnalysisContractError::InvalidContract("analysis_id is empty".to_string()))?;
        Ok(SubmitReceipt {
            remote_id,
            message: self.message,
            estimated_time: self.estimated_time,
        })
    }
}

/// Response body of `GET /status/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Echoed job handle.
    #[serde(default)]
    pub analysis_id: Option<String>,
    /// Job status.
    pub status: WireStatus,
    /// Progress percentage; the service may send floats.
    #[serde(default)]
    pub progress: f64,
    /// Status line.
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusResponse {
    /// Converts the response into a [`StatusSnapshot`], clamping progress to
    /// `0..=100`.
    pub fn into_snapshot(self) -> StatusSnapshot {
        let progress = if self.progress.is_finite() {
            self.progress.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        StatusSnapshot::new(self.status.into(), progress, self.message)
    }
}

/// One item of `GET /history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Job handle.
    pub analysis_id: String,
    /// Job status.
    pub status: WireStatus,
    /// Creation time (service format).
    #[serde(default)]
    pub created_at: String,
    /// Status line.
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of `GET /history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Known analyses.
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

impl HistoryResponse {
    /// Converts the items into store history entries, skipping blank ids.
    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.history
            .into_iter()
            .filter_map(|item| {
                let remote_id = RemoteId::new(item.analysis_id.clone()).ok()?;
                Some(HistoryEntry {
                    id: item.analysis_id,
                    remote_id,
                    state: item.status.into(),
                    message: item.message,
                    created_at: item.created_at,
                })
            })
            .collect()
    }
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Health label (`healthy` when fine).
    pub status: String,
    /// Server timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Server version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable detail; validation errors send structured values.
    #[serde(default)]
    pub detail: Option<Value>,
    /// Short error label.
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Returns `detail` as text, falling back to `error`.
    pub fn detail_text(&self) -> Option<String> {
        match &self.detail {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
            Some(Value::Null) | None => self.error.clone(),
            Some(Value::String(_)) => self.error.clone(),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Export formats offered by `GET /download/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// JSON document.
    Json,
    /// Comma-separated values.
    Csv,
    /// Excel workbook.
    Xlsx,
}

impl ExportFormat {
    /// Query-string value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = AnalysisContractError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(AnalysisContractError::InvalidContract(format!(
                "unsupported export format: {other}"
            ))),
        }
    }
}

/// Parses a submit response.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON and
/// [`AnalysisContractError::InvalidContract`] for a blank `analysis_id`.
pub fn parse_submit_response(raw: &[u8]) -> Result<SubmitReceipt, AnalysisContractError> {
    let parsed: SubmitResponse = serde_json::from_slice(raw)?;
    parsed.into_receipt()
}

/// Parses a status response into a snapshot.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON or an unknown
/// status string.
pub fn parse_status_response(raw: &[u8]) -> Result<StatusSnapshot, AnalysisContractError> {
    let parsed: StatusResponse = serde_json::from_slice(raw)?;
    Ok(parsed.into_snapshot())
}

/// Parses a result payload.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON and
/// [`AnalysisContractError::InvalidContract`] when the body is not an object.
pub fn parse_result_payload(raw: &[u8]) -> Result<ResultPayload, AnalysisContractError> {
    let value: Value = serde_json::from_slice(raw)?;
    if !value.is_object() {
        return Err(AnalysisContractError::InvalidContract(
            "result payload must be a JSON object".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

/// Parses a history response into store entries.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON.
pub fn parse_history_response(raw: &[u8]) -> Result<Vec<HistoryEntry>, AnalysisContractError> {
    let parsed: HistoryResponse = serde_json::from_slice(raw)?;
    Ok(parsed.into_entries())
}

/// Parses a health response.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON.
pub fn parse_health_report(raw: &[u8]) -> Result<HealthReport, AnalysisContractError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Extracts the display detail from an error body, if any.
///
/// Non-JSON bodies yield `None`; callers fall back to status-based messages.
pub fn parse_error_detail(raw: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(raw)
        .ok()
        .and_then(|body| body.detail_text())
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure.
    #[error("analysis decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Parsed payload violates contract invariants.
    #[error("analysis contract violation: {0}")]
    InvalidContract(String),
}
