#![warn(missing_docs)]
//! # motility-app
//!
//! ## Purpose
//! Runs the analysis lifecycle: submits videos to the analysis service,
//! follows each remote job until it ends and keeps the local record store
//! consistent with what the service reports.
//!
//! ## Responsibilities
//! - Create records and drive them `Pending -> Submitting -> Processing ->
//!   Completed`, or into `Failed` from any non-terminal state.
//! - Start one poll loop per processing record and reconcile its snapshots.
//! - Fetch and attach the result before a record is marked `Completed`.
//! - Cancel, delete and retry records on request.
//! - Load process configuration from `MOTILITY_*` variables.
//!
//! ## Data flow
//! [`LifecycleManager::submit`] -> store create -> client upload -> store
//! `Processing` -> poll loop -> snapshot reconcile -> result fetch -> store
//! `Completed`.
//!
//! ## Ownership and lifetimes
//! The store and client are shared by `Arc`. The manager keeps one poll
//! handle per tracked record and releases it when the loop reaches a
//! terminal snapshot, on cancel, or on [`LifecycleManager::dispose`].
//!
//! ## Error model
//! Submission failures are recorded on the record and also returned to the
//! caller as [`LifecycleError`]. Poll failures are only recorded. Every
//! `Failed` record carries a display-ready message.
//!
//! ## Security and privacy notes
//! Parameter values and media bytes are never logged.

use motility_client::ClientError;
use motility_core::{AnalysisState, RecordId};
use motility_store::PersistError;
use thiserror::Error;

mod config;
mod manager;

pub use config::{AppConfig, DEFAULT_SERVER_URL, ManagerConfig};
pub use manager::{InitReport, LifecycleManager};

/// Build-time application version loaded from the root `VERSION` file.
pub const APP_VERSION: &str = env!("MOTILITY_VERSION");

/// Returns the app version sourced from the root `VERSION` file.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Lifecycle manager errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No record has this id.
    #[error("analysis {0} not found")]
    NotFound(RecordId),
    /// The record's state does not allow the action.
    #[error("cannot {action} analysis {id} while it is {state}")]
    InvalidState {
        /// Record id.
        id: RecordId,
        /// Current state.
        state: AnalysisState,
        /// Rejected action.
        action: &'static str,
    },
    /// The upload failed; the record is `Failed`.
    #[error("submission of analysis {id} failed: {source}")]
    Submission {
        /// Record id.
        id: RecordId,
        /// Client failure.
        #[source]
        source: ClientError,
    },
    /// The record was cancelled or deleted before the upload finished.
    #[error("analysis {0} was cancelled")]
    Cancelled(RecordId),
    /// A service call failed.
    #[error("remote call failed: {0}")]
    Remote(#[from] ClientError),
    /// Local storage could not be opened.
    #[error("local storage unavailable: {0}")]
    Storage(#[from] PersistError),
    /// A caller-supplied value was unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Exported results could not be written.
    #[error("cannot write export to {path}: {source}")]
    Export {
        /// Destination path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl LifecycleError {
    /// Message suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "Analysis not found".to_string(),
            Self::InvalidState { action, state, .. } => {
                format!("This analysis cannot be {} while it is {state}", past_tense(action))
            }
            Self::Submission { source, .. } | Self::Remote(source) => source.user_message(),
            Self::Cancelled(_) => "Analysis cancelled".to_string(),
            Self::Storage(_) => "Local analysis storage is unavailable".to_string(),
            Self::InvalidInput(message) => message.clone(),
            Self::Export { path, .. } => format!("Could not write results to {path}"),
        }
    }
}

fn past_tense(action: &str) -> &str {
    match action {
        "retry" => "retried",
        "download" => "downloaded",
        other => other,
    }
}
