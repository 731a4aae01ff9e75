//! Location Reporter Module
//!
//! Background loop that periodically submits the device position using the
//! freshest session credential.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::SessionStore;
use crate::location::PositionSource;
use crate::sync::{ApiClient, ApiError, SendUserLocationRequest};

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(20);

/// Remote endpoint that accepts position reports
#[async_trait]
pub trait LocationSubmitter: Send + Sync {
    async fn submit(
        &self,
        access_token: &str,
        request: &SendUserLocationRequest,
    ) -> Result<bool, ApiError>;
}

#[async_trait]
impl LocationSubmitter for ApiClient {
    async fn submit(
        &self,
        access_token: &str,
        request: &SendUserLocationRequest,
    ) -> Result<bool, ApiError> {
        self.send_user_location(access_token, request).await
    }
}

/// Result of one submission attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportOutcome {
    Success,
    /// The server answered, and the answer was no
    Rejected { status: Option<u16>, message: String },
    /// No usable answer was obtained
    TransportFailure { message: String },
}

impl ReportOutcome {
    pub fn classify(result: Result<bool, ApiError>) -> Self {
        match result {
            Ok(true) => ReportOutcome::Success,
            Ok(false) => ReportOutcome::Rejected {
                status: None,
                message: "server declined the report".into(),
            },
            Err(ApiError::Server { status, message }) => ReportOutcome::Rejected {
                status: Some(status),
                message,
            },
            Err(ApiError::Network(message)) | Err(ApiError::Parse(message)) => {
                ReportOutcome::TransportFailure { message }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReportOutcome::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterState {
    Idle,
    Running,
}

/// Observable snapshot of the reporter
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterStatus {
    pub state: ReporterState,
    pub ticks: u64,
    pub consecutive_failures: u64,
    pub last_outcome: Option<ReportOutcome>,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl Default for ReporterStatus {
    fn default() -> Self {
        Self {
            state: ReporterState::Idle,
            ticks: 0,
            consecutive_failures: 0,
            last_outcome: None,
            last_tick_at: None,
        }
    }
}

/// Reads the inputs for one tick and submits them
#[derive(Clone)]
struct Tick {
    store: SessionStore,
    source: Arc<dyn PositionSource>,
    submitter: Arc<dyn LocationSubmitter>,
}

impl Tick {
    async fn run(&self) -> ReportOutcome {
        let position = self.source.latest();
        let session = self.store.snapshot();

        if !session.is_signed_in() {
            debug!("Reporting without a signed-in session");
        }
        if position.is_unknown() {
            debug!("Reporting sentinel position, no fix yet");
        }

        let request = SendUserLocationRequest {
            member_id: session.member_id,
            latitude: position.latitude,
            longitude: position.longitude,
        };

        let result = self.submitter.submit(&session.access_token, &request).await;
        ReportOutcome::classify(result)
    }
}

/// Owns the background reporting task
pub struct LocationReporter {
    tick: Tick,
    interval: Duration,
    status: Arc<watch::Sender<ReporterStatus>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl LocationReporter {
    pub fn new(
        store: SessionStore,
        source: Arc<dyn PositionSource>,
        submitter: Arc<dyn LocationSubmitter>,
        interval: Duration,
    ) -> Self {
        let (status, _rx) = watch::channel(ReporterStatus::default());

        Self {
            tick: Tick { store, source, submitter },
            interval,
            status: Arc::new(status),
            handle: None,
            cancel_token: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn status(&self) -> ReporterStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReporterStatus> {
        self.status.subscribe()
    }

    /// Run a single report immediately, outside the loop
    pub async fn report_once(&self) -> ReportOutcome {
        self.tick.run().await
    }

    /// Spawn the loop.
    ///
    /// The loop ends when `stop` is called, when the host cancels `cancel`,
    /// or when the reporter is dropped. A host token that is already
    /// cancelled is refused and the reporter stays `Idle`.
    pub fn start(&mut self, cancel: &CancellationToken) -> Result<(), ReporterError> {
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ReporterError::AlreadyRunning);
        }
        if cancel.is_cancelled() {
            return Err(ReporterError::Cancelled);
        }

        let cancel_token = cancel.child_token();
        self.status.send_modify(|s| s.state = ReporterState::Running);

        let handle = tokio::spawn(report_loop(
            self.tick.clone(),
            self.interval,
            Arc::clone(&self.status),
            cancel_token.clone(),
        ));

        info!("Location reporter started, interval {:?}", self.interval);
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(&mut self) -> Result<(), ReporterError> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let result = match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| ReporterError::Join(e.to_string())),
            None => Ok(()),
        };

        self.status.send_modify(|s| s.state = ReporterState::Idle);
        result
    }
}

impl Drop for LocationReporter {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn report_loop(
    tick: Tick,
    interval: Duration,
    status: Arc<watch::Sender<ReporterStatus>>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel_token.cancelled() => break,
        }

        let outcome = tokio::select! {
            outcome = tick.run() => outcome,
            _ = cancel_token.cancelled() => break,
        };

        match &outcome {
            ReportOutcome::Success => debug!("Location reported"),
            ReportOutcome::Rejected { status: code, message } => {
                warn!("Location report rejected (status {:?}): {}", code, message)
            }
            ReportOutcome::TransportFailure { message } => {
                warn!("Location report failed: {}", message)
            }
        }

        status.send_modify(|s| {
            s.ticks += 1;
            s.consecutive_failures = if outcome.is_success() {
                0
            } else {
                s.consecutive_failures + 1
            };
            s.last_outcome = Some(outcome);
            s.last_tick_at = Some(Utc::now());
        });
    }

    status.send_modify(|s| s.state = ReporterState::Idle);
    info!("Location reporter shutting down");
}

/// Reporter errors
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error("Location reporter already running")]
    AlreadyRunning,

    #[error("Cancellation token already cancelled")]
    Cancelled,

    #[error("Location reporter task failed to join: {0}")]
    Join(String),
}
