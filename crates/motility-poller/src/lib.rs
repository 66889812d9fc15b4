#![warn(missing_docs)]
//! # motility-poller
//!
//! ## Purpose
//! Tracks one remote analysis job by asking the service for its status at a
//! fixed interval until the job ends or the caller loses interest.
//!
//! ## Responsibilities
//! - Run one status loop per [`Poller::start`] call as a tokio task.
//! - Deliver every snapshot to a [`SnapshotSink`] before checking
//!   termination.
//! - Absorb transient poll errors up to a ceiling, then emit a synthetic
//!   `Failed` snapshot carrying a `PollExhausted` cause.
//!
//! ## Data flow
//! [`RemoteJobClient::fetch_status`] -> [`StatusSnapshot`] ->
//! [`SnapshotSink::on_snapshot`] -> terminal check -> sleep -> repeat.
//!
//! ## Ownership and lifetimes
//! The loop owns an `Arc` of the client and sink. [`PollHandle`] owns the
//! cancellation token and the task handle; dropping the handle does not stop
//! the loop, [`PollHandle::cancel`] does.
//!
//! ## Error model
//! Poll errors never leave this crate as errors. They are counted, logged,
//! and turned into an exhaustion snapshot once the ceiling is hit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use motility_client::RemoteJobClient;
use motility_core::{RemoteId, RemoteState, StatusSnapshot};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default spacing between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// Default number of consecutive poll errors tolerated.
pub const DEFAULT_RETRY_CEILING: u32 = 5;

/// Timing and retry settings of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed spacing between status requests.
    pub interval: Duration,
    /// Consecutive errors after which the loop gives up (minimum 1).
    pub retry_ceiling: u32,
    /// Upper bound of random delay added after a failed poll.
    pub error_jitter: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            error_jitter: Duration::ZERO,
        }
    }
}

impl PollConfig {
    fn error_delay(&self) -> Duration {
        let jitter_ms = self.error_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Decides whether a snapshot ends the loop.
pub type TerminalPredicate = Arc<dyn Fn(&StatusSnapshot) -> bool + Send + Sync>;

/// Default predicate: the service reports `completed` or `failed`.
pub fn remote_state_is_terminal(snapshot: &StatusSnapshot) -> bool {
    matches!(snapshot.state, RemoteState::Completed | RemoteState::Failed)
}

/// Per-loop options.
#[derive(Clone)]
pub struct PollOptions {
    /// Timing and retry settings.
    pub config: PollConfig,
    /// Termination predicate.
    pub terminal: TerminalPredicate,
}

impl PollOptions {
    /// Options with `config` and the default terminal predicate.
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            terminal: Arc::new(remote_state_is_terminal),
        }
    }

    /// Replaces the terminal predicate.
    pub fn with_terminal(
        mut self,
        predicate: impl Fn(&StatusSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.terminal = Arc::new(predicate);
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}

impl fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollOptions")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Receives snapshots in observation order.
///
/// The loop awaits each delivery before polling again, so snapshots of one
/// job are never delivered concurrently.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Handles one snapshot.
    async fn on_snapshot(&self, snapshot: StatusSnapshot);
}

#[async_trait]
impl<F> SnapshotSink for F
where
    F: Fn(StatusSnapshot) + Send + Sync,
{
    async fn on_snapshot(&self, snapshot: StatusSnapshot) {
        self(snapshot)
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A snapshot satisfied the terminal predicate.
    Terminal(StatusSnapshot),
    /// The retry ceiling was reached; carries the synthetic snapshot.
    Exhausted(StatusSnapshot),
    /// The loop was cancelled.
    Cancelled,
}

/// Starts status loops against one client.
#[derive(Clone)]
pub struct Poller {
    client: Arc<dyn RemoteJobClient>,
}

impl Poller {
    /// Creates a poller using `client`.
    pub fn new(client: Arc<dyn RemoteJobClient>) -> Self {
        Self { client }
    }

    /// Spawns a status loop for `remote_id`.
    ///
    /// The first request is sent immediately. Must be called within a tokio
    /// runtime.
    pub fn start(
        &self,
        remote_id: RemoteId,
        sink: Arc<dyn SnapshotSink>,
        options: PollOptions,
    ) -> PollHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.client),
            remote_id.clone(),
            sink,
            options,
            token.clone(),
        ));
        PollHandle {
            remote_id,
            token,
            task,
        }
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller").finish_non_exhaustive()
    }
}

/// Control handle of one running loop.
#[derive(Debug)]
pub struct PollHandle {
    remote_id: RemoteId,
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Job tracked by this loop.
    pub fn remote_id(&self) -> &RemoteId {
        &self.remote_id
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` when the loop task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to end.
    pub async fn join(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(remote_id = %self.remote_id, error = %error, "poll task ended abnormally");
                PollOutcome::Cancelled
            }
        }
    }
}

async fn run_loop(
    client: Arc<dyn RemoteJobClient>,
    remote_id: RemoteId,
    sink: Arc<dyn SnapshotSink>,
    options: PollOptions,
    token: CancellationToken,
) -> PollOutcome {
    let ceiling = options.config.retry_ceiling.max(1);
    let mut consecutive_errors = 0_u32;
    let mut last_progress = 0_u8;
    let mut attempt = 0_u64;

    loop {
        if token.is_cancelled() {
            return cancelled(&remote_id);
        }
        attempt += 1;

        let polled = client.fetch_status(&remote_id).await;
        if token.is_cancelled() {
            return cancelled(&remote_id);
        }

        let delay = match polled {
            Ok(snapshot) => {
                consecutive_errors = 0;
                last_progress = last_progress.max(snapshot.progress);
                debug!(
                    remote_id = %remote_id,
                    attempt,
                    state = ?snapshot.state,
                    progress = snapshot.progress,
                    "status polled"
                );

                let terminal = (options.terminal)(&snapshot);
                sink.on_snapshot(snapshot.clone()).await;
                if terminal {
                    info!(remote_id = %remote_id, state = ?snapshot.state, "poll loop reached terminal status");
                    return PollOutcome::Terminal(snapshot);
                }
                options.config.interval
            }
            Err(error) => {
                consecutive_errors += 1;
                warn!(
                    remote_id = %remote_id,
                    attempt,
                    consecutive_errors,
                    error = %error,
                    "status poll failed"
                );
                if consecutive_errors >= ceiling {
                    let snapshot =
                        StatusSnapshot::exhausted(consecutive_errors, error.to_string(), last_progress);
                    warn!(remote_id = %remote_id, consecutive_errors, "poll retry ceiling reached");
                    sink.on_snapshot(snapshot.clone()).await;
                    return PollOutcome::Exhausted(snapshot);
                }
                options.config.error_delay()
            }
        };

        tokio::select! {
            _ = token.cancelled() => return cancelled(&remote_id),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled(remote_id: &RemoteId) -> PollOutcome {
    debug!(remote_id = %remote_id, "poll loop cancelled");
    PollOutcome::Cancelled
}
