//! Runtime configuration, loaded from `MOTILITY_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use motility_client::{ClientConfig, ClientError};
use motility_poller::{DEFAULT_RETRY_CEILING, PollConfig};

/// Default analysis service address (local development server).
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Lifecycle manager behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Poll loop timing.
    pub poll: PollConfig,
    /// Also delete the analysis on the service when a record is deleted.
    pub delete_remote: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            delete_remote: true,
        }
    }
}

/// Process-level configuration of the `motility` binary.
///
/// Every field has a default so the binary runs without any variable set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `MOTILITY_SERVER_URL` (default [`DEFAULT_SERVER_URL`]).
    pub server_url: String,
    /// `MOTILITY_DATA_DIR`; unset keeps records in memory only.
    pub data_dir: Option<PathBuf>,
    /// `MOTILITY_POLL_INTERVAL_MS` (default 2000).
    pub poll_interval_ms: u64,
    /// `MOTILITY_POLL_RETRY_CEILING` (default 5).
    pub poll_retry_ceiling: u32,
    /// `MOTILITY_POLL_JITTER_MS` (default 0).
    pub poll_jitter_ms: u64,
    /// `MOTILITY_REQUEST_TIMEOUT_SECS` (default 30).
    pub request_timeout_secs: u64,
    /// `MOTILITY_DELETE_REMOTE` (default on).
    pub delete_remote: bool,
    /// `MOTILITY_LOG`, a `tracing` filter (default `info`).
    pub log_level: String,
    /// `MOTILITY_LOG_JSON`, newline-delimited JSON logs when set to `1`/`true`.
    pub log_json: bool,
}

impl AppConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            server_url: text("MOTILITY_SERVER_URL", DEFAULT_SERVER_URL),
            data_dir: lookup("MOTILITY_DATA_DIR")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            poll_interval_ms: parse_or(&lookup, "MOTILITY_POLL_INTERVAL_MS", 2_000).max(1),
            poll_retry_ceiling: parse_or(&lookup, "MOTILITY_POLL_RETRY_CEILING", DEFAULT_RETRY_CEILING)
                .max(1),
            poll_jitter_ms: parse_or(&lookup, "MOTILITY_POLL_JITTER_MS", 0),
            request_timeout_secs: parse_or(&lookup, "MOTILITY_REQUEST_TIMEOUT_SECS", 30).max(1),
            delete_remote: flag_or(&lookup, "MOTILITY_DELETE_REMOTE", true),
            log_level: text("MOTILITY_LOG", "info"),
            log_json: flag_or(&lookup, "MOTILITY_LOG_JSON", false),
        }
    }

    /// Poll settings derived from this configuration.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            retry_ceiling: self.poll_retry_ceiling,
            error_jitter: Duration::from_millis(self.poll_jitter_ms),
        }
    }

    /// Manager settings derived from this configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            poll: self.poll_config(),
            delete_remote: self.delete_remote,
        }
    }

    /// HTTP client settings derived from this configuration.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidConfig`] for an unusable server address.
    pub fn client_config(&self) -> Result<ClientConfig, ClientError> {
        Ok(ClientConfig::new(&self.server_url)?
            .with_timeout(Duration::from_secs(self.request_timeout_secs)))
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

// `0`, `false`, `off`, `no` disable; `1`, `true`, `on`, `yes` enable.
fn flag_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "0" | "false" | "off" | "no") => false,
        Some(value) if matches!(value.as_str(), "1" | "true" | "on" | "yes") => true,
        _ => default,
    }
}
