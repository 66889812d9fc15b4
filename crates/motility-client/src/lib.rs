#![warn(missing_docs)]
//! # motility-client
//!
//! ## Purpose
//! Talks to the remote analysis service: submits video jobs, reads job
//! status and results, and exposes the service's auxiliary endpoints.
//!
//! ## Responsibilities
//! - Define the [`RemoteJobClient`] seam used by the poller and the
//!   lifecycle manager, so tests can swap in scripted clients.
//! - Provide the production [`HttpJobClient`] over `reqwest`.
//! - Map transport and HTTP failures into [`ClientError`] with a
//!   display-ready message per status code.
//!
//! ## Data flow
//! Lifecycle manager -> [`RemoteJobClient::submit`] -> multipart upload with
//! progress callback -> [`SubmitReceipt`]; poller ->
//! [`RemoteJobClient::fetch_status`] -> [`StatusSnapshot`].
//!
//! ## Error model
//! [`ClientError::Transport`] means no response was received;
//! [`ClientError::Server`] carries the HTTP status and the server's detail.
//! Callers decide retry policy; this crate never retries on its own.
//!
//! ## Security and privacy notes
//! Media bytes and parameter values are never logged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use motility_core::{
    AnalysisParameters, FailureCause, FailureKind, HistoryEntry, InputRef, RemoteId,
    ResultPayload, StatusSnapshot,
};
use serde_json::Value;
use thiserror::Error;

mod http;

pub use http::{ClientConfig, HttpJobClient, validate_base_url};
pub use motility_contract::{ExportFormat, HealthReport, SubmitReceipt};

/// Callback receiving upload progress in percent.
pub type UploadProgress = Arc<dyn Fn(u8) + Send + Sync>;

/// Remote operations against the analysis service.
///
/// Only the four job operations are required; the auxiliary endpoints have
/// default implementations returning [`ClientError::Unsupported`].
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Uploads the input media with `parameters` and returns the job handle.
    ///
    /// `progress` is invoked with a non-decreasing percentage while the
    /// media is transferred.
    async fn submit(
        &self,
        input: &InputRef,
        parameters: &AnalysisParameters,
        progress: Option<UploadProgress>,
    ) -> Result<SubmitReceipt, ClientError>;

    /// Reads the current status of a job.
    async fn fetch_status(&self, remote_id: &RemoteId) -> Result<StatusSnapshot, ClientError>;

    /// Reads the result payload of a completed job.
    async fn fetch_result(&self, remote_id: &RemoteId) -> Result<ResultPayload, ClientError>;

    /// Asks the service to stop a job. Best-effort.
    async fn cancel(&self, remote_id: &RemoteId) -> Result<(), ClientError> {
        self.delete(remote_id).await
    }

    /// Downloads an export of the job's results.
    async fn download(
        &self,
        _remote_id: &RemoteId,
        _format: ExportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        Err(ClientError::Unsupported("download"))
    }

    /// Lists analyses known to the service.
    async fn history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        Err(ClientError::Unsupported("history"))
    }

    /// Deletes an analysis on the service.
    async fn delete(&self, _remote_id: &RemoteId) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("delete"))
    }

    /// Reads aggregate service statistics.
    async fn statistics(&self) -> Result<Value, ClientError> {
        Err(ClientError::Unsupported("statistics"))
    }

    /// Reads the service health report.
    async fn health(&self) -> Result<HealthReport, ClientError> {
        Err(ClientError::Unsupported("health"))
    }

    /// Probes the service and measures round-trip latency.
    async fn test_connection(&self) -> ConnectionReport {
        let started = Instant::now();
        match self.health().await {
            Ok(_) => ConnectionReport {
                success: true,
                latency: Some(started.elapsed()),
                message: "Connection successful".to_string(),
            },
            Err(error) => ConnectionReport {
                success: false,
                latency: None,
                message: error.user_message(),
            },
        }
    }
}

/// Outcome of [`RemoteJobClient::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Whether the service answered its health check.
    pub success: bool,
    /// Round-trip time of the health check.
    pub latency: Option<Duration>,
    /// Display message.
    pub message: String,
}

/// Errors produced by remote operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No response was received (connect failure, timeout, reset).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The service answered with a non-success status.
    #[error("server responded with {status_code}")]
    Server {
        /// HTTP status code.
        status_code: u16,
        /// Server-provided detail.
        detail: Option<String>,
    },
    /// A success response could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),
    /// The input media could not be read.
    #[error("input media unavailable: {0}")]
    Media(String),
    /// Client configuration is invalid.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    /// The client does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl ClientError {
    /// Returns the HTTP status when the service answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Message suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => {
                "Network error - Please check your internet connection".to_string()
            }
            Self::Server {
                status_code,
                detail,
            } => server_message(*status_code, detail.as_deref()),
            Self::Decode(_) => "Unexpected response from the analysis server".to_string(),
            Self::Media(_) => "The selected video could not be read".to_string(),
            Self::InvalidConfig(_) => {
                "The analysis server address is not configured correctly".to_string()
            }
            Self::Unsupported(_) => "This action is not available".to_string(),
        }
    }

    /// Failure category recorded when this error ends a record.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Server { .. } | Self::Decode(_) => FailureKind::ServerError,
            Self::Transport(_) | Self::Media(_) | Self::InvalidConfig(_) | Self::Unsupported(_) => {
                FailureKind::TransportError
            }
        }
    }

    /// Builds the record failure cause for this error.
    pub fn to_failure(&self) -> FailureCause {
        let mut cause =
            FailureCause::new(self.failure_kind(), self.user_message()).with_detail(self.to_string());
        if let Self::Server {
            status_code,
            detail,
        } = self
        {
            cause.status_code = Some(*status_code);
            if let Some(detail) = detail {
                cause.detail = Some(detail.clone());
            }
        }
        cause
    }
}

fn server_message(status_code: u16, detail: Option<&str>) -> String {
    match status_code {
        400 => detail
            .unwrap_or("Bad request - Please check your input")
            .to_string(),
        401 => "Unauthorized - Please check your credentials".to_string(),
        403 => "Forbidden - You do not have permission".to_string(),
        404 => "Resource not found".to_string(),
        422 => detail
            .unwrap_or("Validation error - Please check your input")
            .to_string(),
        500 => "Internal server error - Please try again later".to_string(),
        502 => "Bad gateway - Server is temporarily unavailable".to_string(),
        503 => "Service unavailable - Server is under maintenance".to_string(),
        other => format!(
            "Server error ({other}) - {}",
            detail.unwrap_or("Unknown error")
        ),
    }
}

/// Converts transferred byte counts into non-decreasing percentages.
///
/// The callback fires only when the integer percentage increases.
pub struct ProgressTracker {
    total: u64,
    sent: u64,
    last: Option<u8>,
    callback: Option<UploadProgress>,
}

impl ProgressTracker {
    /// Creates a tracker for `total` bytes.
    pub fn new(total: u64, callback: Option<UploadProgress>) -> Self {
        Self {
            total,
            sent: 0,
            last: None,
            callback,
        }
    }

    /// Records `bytes` more transferred bytes.
    pub fn advance(&mut self, bytes: usize) {
        self.sent = self.sent.saturating_add(bytes as u64).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            ((self.sent.saturating_mul(100)) / self.total) as u8
        };

        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = &self.callback {
            callback(percent);
        }
    }

    /// Last percentage reported.
    pub fn last_reported(&self) -> Option<u8> {
        self.last
    }
}
