//! Analysis session controller.
//!
//! Runs one analysis at a time against the service and owns the
//! [`ReconciledState`] that observers read:
//! - every mutation is published through a `watch` channel
//! - starting a run supersedes (and aborts) the previous one
//! - each run carries a generation number, so a superseded run can never
//!   write into the state of the run that replaced it
//! - cancellation and the optional deadline drop the transport read, which
//!   closes the connection

use futures_util::StreamExt;
use reqwest::{Client, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::model::ReconciledState;
use crate::runner::RunOutcome;
use crate::stream::{ClassifiedEvent, Ingest, StreamError, StreamResult};
use crate::transport::{build_http_client, is_event_stream, read_json_response, send_analysis_request};

/// Shown when the URL to analyze is empty
pub const INVALID_URL_MESSAGE: &str = "Please provide a valid URL";

/// Shown when a run is aborted by the caller
pub const CANCELLED_MESSAGE: &str = "Analysis cancelled";

/// Shown when a run exceeds its deadline
pub const DEADLINE_MESSAGE: &str = "Analysis timed out";

/// A run that has been admitted and is about to touch the network
struct RunTicket {
    generation: u64,
    token: CancellationToken,
    target: String,
}

/// Client for the analysis service, holding the state of the current run
pub struct AnalysisSession {
    config: ClientConfig,
    client: Client,
    state: watch::Sender<ReconciledState>,
    generation: AtomicU64,
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
}

impl AnalysisSession {
    pub fn new(config: ClientConfig) -> StreamResult<Self> {
        let client = build_http_client(&config)?;
        let (state, _) = watch::channel(ReconciledState::default());
        Ok(Self {
            config,
            client,
            state,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Receiver notified after every state mutation
    pub fn subscribe(&self) -> watch::Receiver<ReconciledState> {
        self.state.subscribe()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ReconciledState {
        self.state.borrow().clone()
    }

    /// Generation of the most recently started run
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run one analysis to completion.
    ///
    /// Resolves with the final payload, or with the partial state when the
    /// stream ends without a terminal event.
    pub async fn run(&self, url: &str) -> StreamResult<RunOutcome> {
        let ticket = self.begin(url)?;
        self.execute(ticket).await
    }

    /// Start a run in the background.
    ///
    /// The previous run is superseded before this returns, so state observed
    /// afterwards always belongs to the new run.
    pub fn start(self: &Arc<Self>, url: &str) -> JoinHandle<StreamResult<RunOutcome>> {
        let admitted = self.begin(url);
        let session = Arc::clone(self);
        tokio::spawn(async move { session.execute(admitted?).await })
    }

    /// Abort the in-flight run, if any. Its state is kept with an error set.
    pub fn cancel(&self) {
        if let Some((generation, token)) = self.in_flight().take() {
            info!(generation, "cancelling analysis run");
            token.cancel();
        }
    }

    /// Abort the in-flight run and clear all state
    pub fn reset(&self) {
        self.supersede();
        self.state.send_replace(ReconciledState::default());
    }

    fn begin(&self, url: &str) -> StreamResult<RunTicket> {
        let generation = self.supersede();

        let target = url.trim();
        if target.is_empty() {
            self.state.send_replace(ReconciledState {
                error: Some(INVALID_URL_MESSAGE.to_string()),
                ..Default::default()
            });
            return Err(StreamError::Validation(INVALID_URL_MESSAGE.to_string()));
        }

        let token = CancellationToken::new();
        *self.in_flight() = Some((generation, token.clone()));
        self.state.send_replace(ReconciledState::started());
        info!(generation, url = target, "starting analysis run");

        Ok(RunTicket {
            generation,
            token,
            target: target.to_string(),
        })
    }

    /// Cancel the in-flight run and move to a new generation
    fn supersede(&self) -> u64 {
        self.cancel();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn execute(&self, ticket: RunTicket) -> StreamResult<RunOutcome> {
        let RunTicket {
            generation,
            token,
            target,
        } = ticket;

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(StreamError::Transport(CANCELLED_MESSAGE.to_string())),
            _ = deadline_elapsed(self.config.deadline) => {
                warn!(generation, "analysis run exceeded its deadline");
                Err(StreamError::Transport(DEADLINE_MESSAGE.to_string()))
            }
            result = self.drive(generation, &target) => result,
        };

        {
            let mut in_flight = self.in_flight();
            if in_flight.as_ref().is_some_and(|(g, _)| *g == generation) {
                *in_flight = None;
            }
        }

        match &result {
            Ok(outcome) => {
                info!(generation, degraded = outcome.is_degraded(), "analysis run finished");
            }
            Err(err) => {
                info!(generation, error = %err, "analysis run failed");
                self.publish(generation, |state| state.apply_error(err.message()));
            }
        }
        result
    }

    async fn drive(&self, generation: u64, target: &str) -> StreamResult<RunOutcome> {
        let endpoint = self.config.analyze_url();
        let response = send_analysis_request(&self.client, &endpoint, target).await?;

        if is_event_stream(&response) {
            let status = response.status();
            if !status.is_success() {
                return Err(StreamError::Transport(format!(
                    "HTTP error! status: {}",
                    status.as_u16()
                )));
            }
            debug!(generation, "reading event stream");
            self.drive_stream(generation, response).await
        } else {
            debug!(generation, "reading structured response");
            let payload = read_json_response(response).await?;
            self.publish(generation, |state| state.apply_complete(payload.clone()));
            Ok(RunOutcome::Complete(payload))
        }
    }

    async fn drive_stream(&self, generation: u64, response: Response) -> StreamResult<RunOutcome> {
        let mut ingest = Ingest::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in ingest.push(&chunk) {
                self.apply(generation, event);
            }
        }
        if let Some(event) = ingest.finish() {
            self.apply(generation, event);
        }

        debug!(
            generation,
            frames = ingest.frames_seen(),
            unknown = ingest.unknown_count(),
            "event stream closed"
        );
        if ingest.terminal().is_none() {
            info!(generation, "stream ended without complete or error event");
            self.publish(generation, ReconciledState::finish_degraded);
        }

        let state = self.snapshot();
        ingest.resolve(&state)
    }

    fn apply(&self, generation: u64, event: ClassifiedEvent) {
        if let ClassifiedEvent::Unknown = event {
            return;
        }
        if !self.publish(generation, |state| state.apply(event)) {
            debug!(generation, "discarding event from superseded run");
        }
    }

    /// Mutate the shared state if `generation` is still current
    fn publish<F>(&self, generation: u64, mutate: F) -> bool
    where
        F: FnOnce(&mut ReconciledState),
    {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            mutate(state);
            true
        })
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn deadline_elapsed(deadline: Option<Duration>) {
    match deadline {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AnalysisSession {
        let config = ClientConfig::new("http://127.0.0.1:9")
            .analyze_path("/analyze")
            .deadline(None);
        AnalysisSession::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_blank_url_fails_validation() {
        let session = session();
        let err = session.run("   ").await.unwrap_err();
        assert_eq!(err, StreamError::Validation(INVALID_URL_MESSAGE.to_string()));

        let state = session.snapshot();
        assert_eq!(state.error.as_deref(), Some(INVALID_URL_MESSAGE));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_reset_clears_state_and_bumps_generation() {
        let session = session();
        let _ = session.run("").await;
        let before = session.generation();

        session.reset();
        assert_eq!(session.generation(), before + 1);
        assert_eq!(session.snapshot(), ReconciledState::default());
    }

    #[tokio::test]
    async fn test_stale_generation_is_not_published() {
        let session = session();
        let _ = session.run("").await;
        let stale = session.generation();
        session.reset();

        assert!(!session.publish(stale, |state| state.apply_error("late")));
        assert_eq!(session.snapshot().error, None);
    }
}
